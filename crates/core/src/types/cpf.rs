//! Brazilian taxpayer ID (CPF).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Cpf`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CpfError {
    #[error("CPF must have 11 digits")]
    WrongLength,
    #[error("CPF cannot repeat a single digit")]
    RepeatedDigits,
    #[error("CPF check digits do not match")]
    CheckDigit,
}

/// A validated CPF, stored as 11 bare digits.
///
/// Punctuation in the input is ignored, so `123.456.789-09` and
/// `12345678909` parse to the same value. Display uses the punctuated form.
///
/// ```
/// use dermosul_core::Cpf;
///
/// let cpf = Cpf::parse("529.982.247-25").unwrap();
/// assert_eq!(cpf.as_str(), "52998224725");
/// assert_eq!(cpf.to_string(), "529.982.247-25");
/// assert!(Cpf::parse("111.111.111-11").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cpf(String);

impl Cpf {
    /// Parse and validate a CPF.
    ///
    /// # Errors
    ///
    /// Returns an error if the input does not hold exactly 11 digits, is a
    /// single repeated digit, or fails the check-digit test.
    pub fn parse(s: &str) -> Result<Self, CpfError> {
        let digits: Vec<u32> = s.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 11 {
            return Err(CpfError::WrongLength);
        }
        if digits.windows(2).all(|w| w.first() == w.last()) {
            return Err(CpfError::RepeatedDigits);
        }

        let (body, checks) = digits.split_at(9);
        let first_check = check_digit(body);
        let second_check = check_digit(digits.get(..10).unwrap_or_default());
        if checks != [first_check, second_check] {
            return Err(CpfError::CheckDigit);
        }

        Ok(Self(
            digits
                .iter()
                .filter_map(|d| char::from_digit(*d, 10))
                .collect(),
        ))
    }

    /// The 11 bare digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Weighted mod-11 check digit over a prefix of 9 or 10 digits.
#[allow(clippy::cast_possible_truncation)]
fn check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .zip((2..=weight_start).rev())
        .map(|(d, w)| d * w)
        .sum();
    let rem = (sum * 10) % 11;
    if rem == 10 { 0 } else { rem }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.0;
        match (s.get(0..3), s.get(3..6), s.get(6..9), s.get(9..11)) {
            (Some(a), Some(b), Some(c), Some(d)) => write!(f, "{a}.{b}.{c}-{d}"),
            _ => f.write_str(s),
        }
    }
}

impl std::str::FromStr for Cpf {
    type Err = CpfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Cpf {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Cpf {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Cpf {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cpfs() {
        assert!(Cpf::parse("52998224725").is_ok());
        assert!(Cpf::parse("529.982.247-25").is_ok());
        assert!(Cpf::parse("390.533.447-05").is_ok());
        assert!(Cpf::parse("111.444.777-35").is_ok());
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(Cpf::parse(""), Err(CpfError::WrongLength));
        assert_eq!(Cpf::parse("5299822472"), Err(CpfError::WrongLength));
        assert_eq!(Cpf::parse("529982247251"), Err(CpfError::WrongLength));
    }

    #[test]
    fn test_repeated_digits() {
        assert_eq!(Cpf::parse("000.000.000-00"), Err(CpfError::RepeatedDigits));
        assert_eq!(Cpf::parse("99999999999"), Err(CpfError::RepeatedDigits));
    }

    #[test]
    fn test_check_digits() {
        assert_eq!(Cpf::parse("529.982.247-24"), Err(CpfError::CheckDigit));
        assert_eq!(Cpf::parse("529.982.247-15"), Err(CpfError::CheckDigit));
    }

    #[test]
    fn test_display() {
        let cpf = Cpf::parse("11144477735").unwrap();
        assert_eq!(cpf.to_string(), "111.444.777-35");
    }
}
