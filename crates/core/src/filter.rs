//! 벤더 공통 조회 필터
//!
//! 시간 범위와 최소 심각도는 모든 벤더가 해석하며, 나머지 조건은
//! `params`에 자유 형식으로 담겨 각 벤더 클라이언트가 자신의 문법
//! (FQL, OData, 쿼리 파라미터)으로 변환합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Severity;

/// 필터 파라미터 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// 불리언 플래그
    Flag(bool),
    /// 숫자
    Number(i64),
    /// 문자열
    Text(String),
}

impl FilterValue {
    /// CLI 인자 등 문자열 입력에서 값을 추론합니다.
    ///
    /// `true`/`false`는 플래그, 정수는 숫자, 나머지는 문자열로 해석합니다.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => Self::Flag(true),
            "false" => Self::Flag(false),
            _ => match raw.parse::<i64>() {
                Ok(n) => Self::Number(n),
                Err(_) => Self::Text(raw.to_owned()),
            },
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// 이벤트 조회 필터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// 조회 시작 시각 (포함)
    pub since: Option<DateTime<Utc>>,
    /// 조회 종료 시각 (제외)
    pub until: Option<DateTime<Utc>>,
    /// 최소 심각도
    pub min_severity: Option<Severity>,
    /// 벤더별 추가 조건
    #[serde(default)]
    pub params: BTreeMap<String, FilterValue>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// 문자열 파라미터를 조회합니다. 숫자/플래그는 문자열로 변환됩니다.
    pub fn text(&self, key: &str) -> Option<String> {
        self.params.get(key).map(|v| v.to_string())
    }

    /// 숫자 파라미터를 조회합니다.
    pub fn number(&self, key: &str) -> Option<i64> {
        match self.params.get(key) {
            Some(FilterValue::Number(n)) => Some(*n),
            Some(FilterValue::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// 플래그 파라미터를 조회합니다.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.params.get(key) {
            Some(FilterValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    /// 시간 범위와 파라미터 키를 검증합니다.
    ///
    /// `allowed`에 없는 키가 있으면 `InvalidFilter`를 반환합니다.
    pub fn validate(&self, allowed: &[&str]) -> Result<(), ConfigError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since >= until
        {
            return Err(ConfigError::InvalidFilter {
                field: "since".to_owned(),
                reason: format!("since ({since}) must be before until ({until})"),
            });
        }

        if let Some(key) = self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(ConfigError::InvalidFilter {
                field: key.clone(),
                reason: format!("unsupported key, expected one of: {}", allowed.join(", ")),
            });
        }

        Ok(())
    }
}
