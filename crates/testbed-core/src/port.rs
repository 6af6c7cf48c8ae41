//! Port coercion and validation.

use crate::{Error, Result};

/// Values that may be coerced into a TCP port.
///
/// A value is accepted when it denotes a finite, integral number in
/// `1..=65535`. Strings are trimmed and parsed as numbers first.
pub trait IntoPort {
    fn into_port(self) -> Result<u16>;
}

/// Validate and coerce a port, failing with [`Error::InvalidPort`].
pub fn validate_port(value: impl IntoPort) -> Result<u16> {
    value.into_port()
}

fn from_i64(value: i64) -> Result<u16> {
    if value <= 0 {
        return Err(Error::InvalidPort(format!("{value} is not positive")));
    }
    u16::try_from(value).map_err(|_| Error::InvalidPort(format!("{value} is out of range")))
}

fn from_f64(value: f64) -> Result<u16> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(Error::InvalidPort(format!("{value} is not an integer")));
    }
    if value <= 0.0 || value > f64::from(u16::MAX) {
        return Err(Error::InvalidPort(format!("{value} is out of range")));
    }
    Ok(value as u16)
}

impl IntoPort for u16 {
    fn into_port(self) -> Result<u16> {
        from_i64(i64::from(self))
    }
}

impl IntoPort for u32 {
    fn into_port(self) -> Result<u16> {
        from_i64(i64::from(self))
    }
}

impl IntoPort for i32 {
    fn into_port(self) -> Result<u16> {
        from_i64(i64::from(self))
    }
}

impl IntoPort for i64 {
    fn into_port(self) -> Result<u16> {
        from_i64(self)
    }
}

impl IntoPort for u64 {
    fn into_port(self) -> Result<u16> {
        i64::try_from(self)
            .map_err(|_| Error::InvalidPort(format!("{self} is out of range")))
            .and_then(from_i64)
    }
}

impl IntoPort for f64 {
    fn into_port(self) -> Result<u16> {
        from_f64(self)
    }
}

impl IntoPort for &str {
    fn into_port(self) -> Result<u16> {
        let trimmed = self.trim();
        let number: f64 = trimmed
            .parse()
            .map_err(|_| Error::InvalidPort(format!("{self:?} is not a number")))?;
        from_f64(number)
    }
}

impl IntoPort for String {
    fn into_port(self) -> Result<u16> {
        self.as_str().into_port()
    }
}

impl IntoPort for &String {
    fn into_port(self) -> Result<u16> {
        self.as_str().into_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_integers_and_numeric_strings() {
        assert_eq!(validate_port(5432u16).unwrap(), 5432);
        assert_eq!(validate_port(6379i32).unwrap(), 6379);
        assert_eq!(validate_port(" 8080 ").unwrap(), 8080);
        assert_eq!(validate_port(9000.0f64).unwrap(), 9000);
    }

    #[test]
    fn test_rejects_zero_and_negative() {
        assert!(matches!(validate_port(0u16), Err(Error::InvalidPort(_))));
        assert!(matches!(validate_port(-1i32), Err(Error::InvalidPort(_))));
        assert!(matches!(validate_port("-5"), Err(Error::InvalidPort(_))));
    }

    #[test]
    fn test_rejects_non_numbers() {
        assert!(matches!(
            validate_port("not-a-number"),
            Err(Error::InvalidPort(_))
        ));
        assert!(matches!(validate_port(f64::NAN), Err(Error::InvalidPort(_))));
        assert!(matches!(validate_port(12.5f64), Err(Error::InvalidPort(_))));
        assert!(matches!(validate_port(70000u32), Err(Error::InvalidPort(_))));
    }
}
