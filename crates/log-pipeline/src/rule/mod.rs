//! 메트릭 규칙 엔진 -- YAML 규칙 기반 로그 → 메트릭 추출
//!
//! 규칙은 패턴 템플릿(또는 정규식)과 필드 추출 규격, 메트릭 종류,
//! 태그 템플릿으로 구성됩니다. 로딩 시 한 번 컴파일되며 이후 불변입니다.
//!
//! # 규칙 형식
//! ```yaml
//! counters:
//!   - name: requests
//!     pattern: "user=<user> status=<code:number>"
//! histograms:
//!   - name: http.latency
//!     pattern: "<method> * took <ms:number>ms"
//!     value: ms
//! ```
//!
//! # 아키텍처
//! - [`RuleEngine`]: 컴파일된 규칙 목록 및 레코드 평가
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`matcher`]: 규칙 하나의 매칭/추출 로직
//! - [`template`]: 패턴 템플릿 컴파일 및 백트래킹 매칭
//! - [`token`]: 단어/숫자/인용 문자열/IP 토큰 인식기
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod template;
pub mod token;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::{CompiledRule, Extraction};
pub use template::{Captures, Template};
pub use token::TokenClass;
pub use types::{MetricRule, RuleSet};

use std::path::Path;

use crate::decoder::NormalizedRecord;
use crate::error::LogPipelineError;

/// 규칙 엔진 -- 컴파일된 규칙 목록
///
/// 카운터 → 게이지 → 히스토그램 순서로, 각 종류 안에서는 설정 순서대로
/// 규칙을 평가합니다. 읽기 전용이므로 여러 수집 스레드가 공유할 수 있습니다.
///
/// # 사용 예시
/// ```ignore
/// let engine = RuleEngine::load("/etc/logharvest/rules.yml").await?;
/// for extraction in engine.evaluate(&record) {
///     // 레지스트리 갱신
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// 규칙 집합을 컴파일합니다.
    ///
    /// 하나라도 컴파일에 실패하면 에러를 반환합니다.
    pub fn compile(rule_set: &RuleSet) -> Result<Self, LogPipelineError> {
        let rules = matcher::compile_all(rule_set.iter())?;
        Ok(Self { rules })
    }

    /// 파일 또는 디렉토리에서 규칙을 로드하고 컴파일합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let rule_set = RuleLoader::load_path(path).await?;
        Self::compile(&rule_set)
    }

    /// 컴파일된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 컴파일된 규칙 목록
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// 레코드를 모든 규칙에 대해 평가합니다.
    ///
    /// 매칭된 규칙마다 하나의 [`Extraction`]을 생성합니다.
    pub fn evaluate<'a>(
        &'a self,
        record: &'a NormalizedRecord,
    ) -> impl Iterator<Item = Extraction> + 'a {
        self.rules.iter().filter_map(move |rule| rule.extract(record))
    }
}
