//! Process exit codes matching §6 of the specification: 0 normal, 130
//! interrupted, 1 other. The table is intentionally small; specforge's CLI
//! surface is thin glue around the processor, not a place to invent a rich
//! exit-code vocabulary.

/// Type-safe process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: Self = Self(0);
    pub const OTHER: Self = Self(1);
    pub const INTERRUPTED: Self = Self(130);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }
}

impl From<&crate::error::SpecforgeError> for ExitCode {
    fn from(_err: &crate::error::SpecforgeError) -> Self {
        Self::OTHER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
    }

    #[test]
    fn interrupted_is_130() {
        assert_eq!(ExitCode::INTERRUPTED.as_i32(), 130);
    }
}
