//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의

use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Ethereum 주소 타입 (lowercase 0x + 40 hex)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthAddress(String);

impl EthAddress {
    pub fn new(addr: &str) -> Result<Self, String> {
        let addr = addr.trim().to_lowercase();
        if addr.starts_with("0x")
            && addr.len() == 42
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            Ok(Self(addr))
        } else {
            Err("Invalid Ethereum address format".to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 금액 파싱 에러
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a plain decimal number")]
    Malformed,

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("amount has more than {} fractional digits", Amount::SCALE)]
    TooPrecise,
}

/// 원장 금액 (양수, 소수점 이하 최대 2자리)
///
/// 항상 scale 2로 정규화되어 저장됨 ("40" → "40.00")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount(BigDecimal);

impl Amount {
    /// 잔액과 금액의 소수 자릿수
    pub const SCALE: i64 = 2;

    /// 허용하는 입력 문자열 최대 길이
    const MAX_LEN: usize = 32;

    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        if raw.is_empty() {
            return Err(AmountError::Empty);
        }
        // 부호, 지수 표기, 공백은 거부
        let mut dots = 0;
        for c in raw.chars() {
            match c {
                '0'..='9' => {}
                '.' => dots += 1,
                _ => return Err(AmountError::Malformed),
            }
        }
        if dots > 1 || raw.len() > Self::MAX_LEN || raw == "." {
            return Err(AmountError::Malformed);
        }

        let value = BigDecimal::from_str(raw).map_err(|_| AmountError::Malformed)?;
        if value <= BigDecimal::zero() {
            return Err(AmountError::NotPositive);
        }
        let (_, scale) = value.normalized().as_bigint_and_exponent();
        if scale > Self::SCALE {
            return Err(AmountError::TooPrecise);
        }

        Ok(Self(value.with_scale(Self::SCALE)))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
