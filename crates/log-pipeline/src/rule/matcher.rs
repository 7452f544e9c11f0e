//! 규칙 매칭 로직 -- 컴파일된 규칙과 레코드로부터 메트릭 추출
//!
//! [`CompiledRule`]은 규칙 로딩 시 한 번 컴파일되며, 이후 모든 수집 스레드가
//! 읽기 전용으로 공유합니다. 매칭 실패는 에러가 아니라 `None`입니다.

use std::collections::HashSet;

use regex::Regex;

use logharvest_core::types::{MetricIdentity, MetricKind};

use super::template::{Captures, Template, is_valid_capture_name};
use super::types::MetricRule;
use crate::decoder::NormalizedRecord;
use crate::error::LogPipelineError;

/// 매칭 성공 시 추출 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// 메트릭 식별자 (전역 접두어 미적용)
    pub identity: MetricIdentity,
    /// 메트릭 종류
    pub kind: MetricKind,
    /// 추출된 값. 값 캡처가 없는 카운터 규칙은 `None`
    pub value: Option<f64>,
}

/// 패턴 엔진 -- 템플릿 또는 정규식
#[derive(Debug, Clone)]
enum PatternEngine {
    Template(Template),
    Regex(Regex),
}

impl PatternEngine {
    fn captures(&self, input: &str) -> Option<Captures> {
        match self {
            Self::Template(t) => t.captures(input),
            Self::Regex(re) => {
                let caps = re.captures(input)?;
                let mut out = Captures::default();
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        out.push(name, m.as_str());
                    }
                }
                Some(out)
            }
        }
    }

    fn capture_names(&self) -> Vec<String> {
        match self {
            Self::Template(t) => t.capture_names().map(str::to_owned).collect(),
            Self::Regex(re) => re.capture_names().flatten().map(str::to_owned).collect(),
        }
    }
}

/// 메트릭 이름 조각 -- 리터럴 또는 캡처 참조
#[derive(Debug, Clone, PartialEq)]
enum NamePart {
    Literal(String),
    Capture(String),
}

/// 컴파일된 메트릭 규칙
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    name_parts: Vec<NamePart>,
    kind: MetricKind,
    engine: PatternEngine,
    fields: Vec<String>,
    value: Option<String>,
    /// (태그 키, 캡처 이름)
    tags: Vec<(String, String)>,
    static_tags: Vec<(String, String)>,
}

impl CompiledRule {
    /// 규칙을 검증하고 컴파일합니다.
    pub fn compile(rule: &MetricRule, kind: MetricKind) -> Result<Self, LogPipelineError> {
        rule.validate(kind)?;

        let invalid = |reason: String| LogPipelineError::RuleValidation {
            rule: rule.name.clone(),
            reason,
        };

        let engine = match (&rule.pattern, &rule.regex) {
            (Some(pattern), _) => PatternEngine::Template(
                Template::compile(pattern, rule.partial)
                    .map_err(|e| invalid(format!("invalid pattern: {e}")))?,
            ),
            (None, Some(regex)) => {
                let source = if rule.partial {
                    regex.clone()
                } else {
                    format!("^(?:{regex})$")
                };
                PatternEngine::Regex(
                    Regex::new(&source).map_err(|e| invalid(format!("invalid regex: {e}")))?,
                )
            }
            (None, None) => return Err(invalid("no pattern".to_owned())),
        };

        let captures: HashSet<String> = engine.capture_names().into_iter().collect();
        let name_parts = parse_name(&rule.name).map_err(invalid)?;
        let name_refs: HashSet<&str> = name_parts
            .iter()
            .filter_map(|p| match p {
                NamePart::Capture(c) => Some(c.as_str()),
                NamePart::Literal(_) => None,
            })
            .collect();

        for reference in &name_refs {
            if !captures.contains(*reference) {
                return Err(invalid(format!(
                    "name references unknown capture '{reference}'"
                )));
            }
        }

        if let Some(value) = &rule.value
            && !captures.contains(value)
        {
            return Err(invalid(format!("value capture '{value}' is not defined")));
        }

        let tags: Vec<(String, String)> = match &rule.tags {
            Some(explicit) => {
                for capture in explicit.values() {
                    if !captures.contains(capture) {
                        return Err(invalid(format!(
                            "tag capture '{capture}' is not defined"
                        )));
                    }
                }
                explicit
                    .iter()
                    .map(|(k, c)| (k.clone(), c.clone()))
                    .collect()
            }
            None => engine
                .capture_names()
                .into_iter()
                .filter(|c| rule.value.as_deref() != Some(c.as_str()))
                .filter(|c| !name_refs.contains(c.as_str()))
                .map(|c| (c.clone(), c))
                .collect(),
        };

        let dynamic_keys: HashSet<&str> = tags.iter().map(|(k, _)| k.as_str()).collect();
        if let Some(dup) = rule
            .static_tags
            .keys()
            .find(|k| dynamic_keys.contains(k.as_str()))
        {
            return Err(invalid(format!(
                "tag key '{dup}' is both static and captured"
            )));
        }

        Ok(Self {
            name: rule.name.clone(),
            name_parts,
            kind,
            engine,
            fields: rule.fields.clone(),
            value: rule.value.clone(),
            tags,
            static_tags: rule
                .static_tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// 규칙 이름 (치환 전)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 메트릭 종류
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// 레코드에 규칙을 적용합니다.
    ///
    /// 설정된 필드를 순서대로 시도하여 처음 매칭된 필드의 결과를 반환합니다.
    /// 값 캡처가 유한한 숫자로 파싱되지 않으면 매칭되지 않은 것으로 취급합니다.
    pub fn extract(&self, record: &NormalizedRecord) -> Option<Extraction> {
        let captures = self
            .fields
            .iter()
            .filter_map(|field| record.field(field))
            .find_map(|text| self.engine.captures(text))?;

        let value = match &self.value {
            Some(capture) => {
                let parsed: f64 = captures.get(capture)?.trim().parse().ok()?;
                if !parsed.is_finite() {
                    return None;
                }
                Some(parsed)
            }
            None => None,
        };

        let mut name = String::with_capacity(self.name.len());
        for part in &self.name_parts {
            match part {
                NamePart::Literal(lit) => name.push_str(lit),
                NamePart::Capture(c) => name.push_str(captures.get(c)?),
            }
        }

        let mut tags = Vec::with_capacity(self.tags.len() + self.static_tags.len());
        for (key, capture) in &self.tags {
            if let Some(v) = captures.get(capture) {
                tags.push((key.clone(), v.to_owned()));
            }
        }
        tags.extend(self.static_tags.iter().cloned());

        Some(Extraction {
            identity: MetricIdentity::new(name, tags),
            kind: self.kind,
            value,
        })
    }
}

/// 메트릭 이름을 리터럴/캡처 참조 조각으로 분해합니다.
fn parse_name(name: &str) -> Result<Vec<NamePart>, String> {
    let mut parts = Vec::new();
    let mut rest = name;

    while let Some(open) = rest.find('<') {
        if open > 0 {
            parts.push(NamePart::Literal(rest[..open].to_owned()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('>')
            .ok_or_else(|| format!("unterminated capture reference in name '{name}'"))?;
        let reference = after[..close].trim();
        if !is_valid_capture_name(reference) {
            return Err(format!("invalid capture reference '<{reference}>' in name"));
        }
        parts.push(NamePart::Capture(reference.to_owned()));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        parts.push(NamePart::Literal(rest.to_owned()));
    }

    Ok(parts)
}

/// 모든 규칙을 선언 순서대로 컴파일합니다.
pub(crate) fn compile_all<'a>(
    rules: impl Iterator<Item = (MetricKind, &'a MetricRule)>,
) -> Result<Vec<CompiledRule>, LogPipelineError> {
    rules
        .map(|(kind, rule)| CompiledRule::compile(rule, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(message: &str) -> NormalizedRecord {
        let mut fields = HashMap::new();
        fields.insert("message".to_owned(), message.to_owned());
        NormalizedRecord::new(fields, None)
    }

    fn counter(rule: MetricRule) -> CompiledRule {
        CompiledRule::compile(&rule, MetricKind::Counter).unwrap()
    }

    #[test]
    fn user_status_extraction() {
        let rule = counter(
            MetricRule::with_pattern("requests", "user=<user> status=<code:number>").value("code"),
        );
        let ext = rule.extract(&record("user=alice status=500")).unwrap();
        assert_eq!(ext.identity.name(), "requests");
        assert_eq!(
            ext.identity.tags(),
            &[("user".to_owned(), "alice".to_owned())]
        );
        assert_eq!(ext.value, Some(500.0));
        assert_eq!(ext.kind, MetricKind::Counter);

        assert!(rule.extract(&record("user=alice status=five")).is_none());
    }

    #[test]
    fn counter_without_value_has_no_value() {
        let rule = counter(MetricRule::with_pattern("done", "request completed"));
        let ext = rule.extract(&record("request completed")).unwrap();
        assert_eq!(ext.value, None);
        assert!(ext.identity.tags().is_empty());
    }

    #[test]
    fn name_substitution_excludes_capture_from_tags() {
        let rule = counter(MetricRule::with_pattern(
            "http.<method>.count",
            "<method> <path:any>",
        ));
        let ext = rule.extract(&record("GET /index.html")).unwrap();
        assert_eq!(ext.identity.name(), "http.GET.count");
        assert_eq!(
            ext.identity.tags(),
            &[("path".to_owned(), "/index.html".to_owned())]
        );
    }

    #[test]
    fn explicit_tags_and_static_tags() {
        let rule = CompiledRule::compile(
            &MetricRule::with_pattern("latency", "<host> <op> <ms:number>")
                .value("ms")
                .tag("server", "host")
                .static_tag("env", "prod"),
            MetricKind::Histogram,
        )
        .unwrap();
        let ext = rule.extract(&record("web-01 read 12.5")).unwrap();
        // 명시적 태그만 사용되므로 op는 태그가 아닙니다.
        assert_eq!(
            ext.identity.tags(),
            &[
                ("env".to_owned(), "prod".to_owned()),
                ("server".to_owned(), "web-01".to_owned())
            ]
        );
        assert_eq!(ext.value, Some(12.5));
    }

    #[test]
    fn long_message_still_extracts() {
        let rule = CompiledRule::compile(
            &MetricRule::with_pattern("status", "* status=<code:number>").value("code"),
            MetricKind::Gauge,
        )
        .unwrap();
        let message = format!("{} status=404", "x".repeat(150_000));

        let ext = rule.extract(&record(&message)).unwrap();
        assert_eq!(ext.value, Some(404.0));
    }

    #[test]
    fn regex_rule_extracts_named_groups() {
        let mut rule_def = MetricRule::with_pattern("bytes", "");
        rule_def.pattern = None;
        rule_def.regex = Some(r"sent (?P<n>\d+) bytes to (?P<peer>\S+)".to_owned());
        let rule = CompiledRule::compile(&rule_def.value("n"), MetricKind::Gauge).unwrap();

        let ext = rule.extract(&record("sent 512 bytes to db-1")).unwrap();
        assert_eq!(ext.value, Some(512.0));
        assert_eq!(
            ext.identity.tags(),
            &[("peer".to_owned(), "db-1".to_owned())]
        );
        // 정규식도 기본적으로 전체 값에 고정됩니다.
        assert!(rule.extract(&record("x sent 512 bytes to db-1")).is_none());
    }

    #[test]
    fn fields_are_tried_in_order() {
        let rule = counter(
            MetricRule::with_pattern("hits", "hit <n:number>")
                .value("n")
                .fields(vec!["primary".to_owned(), "message".to_owned()]),
        );

        let mut fields = HashMap::new();
        fields.insert("primary".to_owned(), "miss".to_owned());
        fields.insert("message".to_owned(), "hit 3".to_owned());
        let ext = rule.extract(&NormalizedRecord::new(fields, None)).unwrap();
        assert_eq!(ext.value, Some(3.0));

        let mut fields = HashMap::new();
        fields.insert("other".to_owned(), "hit 3".to_owned());
        assert!(rule.extract(&NormalizedRecord::new(fields, None)).is_none());
    }

    #[test]
    fn non_finite_value_is_no_match() {
        let rule = CompiledRule::compile(
            &MetricRule::with_pattern("v", "v=<x:word>").value("x"),
            MetricKind::Gauge,
        )
        .unwrap();
        assert!(rule.extract(&record("v=inf")).is_none());
        assert!(rule.extract(&record("v=NaN")).is_none());
        assert_eq!(rule.extract(&record("v=2.5")).unwrap().value, Some(2.5));
    }

    #[test]
    fn compile_rejects_unknown_references() {
        let bad_value = MetricRule::with_pattern("x", "<a>").value("b");
        assert!(CompiledRule::compile(&bad_value, MetricKind::Counter).is_err());

        let bad_name = MetricRule::with_pattern("x.<b>", "<a>");
        assert!(CompiledRule::compile(&bad_name, MetricKind::Counter).is_err());

        let bad_tag = MetricRule::with_pattern("x", "<a>").tag("k", "b");
        assert!(CompiledRule::compile(&bad_tag, MetricKind::Counter).is_err());
    }

    #[test]
    fn compile_rejects_static_and_dynamic_tag_clash() {
        let rule = MetricRule::with_pattern("x", "<host>").static_tag("host", "fixed");
        let err = CompiledRule::compile(&rule, MetricKind::Counter).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn compile_rejects_bad_pattern() {
        let rule = MetricRule::with_pattern("x", "<open");
        let err = CompiledRule::compile(&rule, MetricKind::Counter).unwrap_err();
        assert!(matches!(err, LogPipelineError::RuleValidation { .. }));
    }

    #[test]
    fn parse_name_parts() {
        assert_eq!(
            parse_name("a.<b>.c").unwrap(),
            vec![
                NamePart::Literal("a.".to_owned()),
                NamePart::Capture("b".to_owned()),
                NamePart::Literal(".c".to_owned())
            ]
        );
        assert!(parse_name("a.<b").is_err());
        assert!(parse_name("a.<>").is_err());
    }
}
