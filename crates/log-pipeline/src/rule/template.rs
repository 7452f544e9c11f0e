//! 패턴 템플릿 -- 리터럴, 와일드카드, 이름 있는 캡처의 조합
//!
//! # 문법
//! - 리터럴 텍스트는 그대로 매칭됩니다. `\`는 다음 문자를 이스케이프합니다.
//! - `*`는 캡처하지 않는 와일드카드입니다 (빈 문자열 포함).
//! - `<name>`은 단어를, `<name:class>`는 해당 클래스의 토큰을 캡처합니다.
//!   클래스: `word`, `number`, `quoted`, `ipv4`, `ipv6`, `ip`, `any`
//!
//! 매칭은 기본적으로 필드 값 전체에 고정(anchored)되며, `partial` 템플릿은
//! 값의 어느 부분과 매칭되어도 됩니다.
//!
//! # 사용 예시
//! ```ignore
//! let template = Template::compile("user=<user> status=<code:number>", false)?;
//! let caps = template.captures("user=alice status=500").unwrap();
//! assert_eq!(caps.get("code"), Some("500"));
//! ```

use std::collections::HashSet;

use super::token::TokenClass;
use crate::error::LogPipelineError;

/// 매칭 1회당 기본 단계 예산
const BASE_MATCH_STEPS: usize = 100_000;

/// 입력 바이트당 추가 단계 예산
const STEPS_PER_BYTE: usize = 8;

/// 캡처 이름 최대 길이
const MAX_CAPTURE_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Wildcard,
    Capture { name: String, class: TokenClass },
}

/// 컴파일된 패턴 템플릿
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    partial: bool,
}

/// 템플릿 매칭으로 얻은 캡처 목록 (템플릿 순서)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    values: Vec<(String, String)>,
}

impl Captures {
    /// 캡처 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// 모든 캡처 (이름, 값)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// 캡처 수
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 캡처가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.push((name.into(), value.into()));
    }
}

impl Template {
    /// 템플릿 문자열을 컴파일합니다.
    pub fn compile(source: &str, partial: bool) -> Result<Self, LogPipelineError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut seen = HashSet::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => literal.push(escaped),
                    None => {
                        return Err(LogPipelineError::PatternCompile {
                            position: pos,
                            reason: "dangling escape at end of template".to_owned(),
                        });
                    }
                },
                '*' => {
                    flush_literal(&mut literal, &mut segments);
                    // 연속 와일드카드는 하나로 취급
                    if segments.last() != Some(&Segment::Wildcard) {
                        segments.push(Segment::Wildcard);
                    }
                }
                '<' => {
                    flush_literal(&mut literal, &mut segments);
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '>' {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if !closed {
                        return Err(LogPipelineError::PatternCompile {
                            position: pos,
                            reason: "unterminated capture".to_owned(),
                        });
                    }
                    let (name, class) = parse_capture(&body, pos)?;
                    if !seen.insert(name.clone()) {
                        return Err(LogPipelineError::PatternCompile {
                            position: pos,
                            reason: format!("duplicate capture '{name}'"),
                        });
                    }
                    segments.push(Segment::Capture { name, class });
                }
                other => literal.push(other),
            }
        }
        flush_literal(&mut literal, &mut segments);

        if segments.is_empty() {
            return Err(LogPipelineError::PatternCompile {
                position: 0,
                reason: "template must not be empty".to_owned(),
            });
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
            partial,
        })
    }

    /// 원본 템플릿 문자열
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 부분 매칭 허용 여부
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// 템플릿에 선언된 캡처 이름 (템플릿 순서)
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// 입력이 템플릿에 매칭되는지 확인합니다.
    pub fn is_match(&self, input: &str) -> bool {
        self.captures(input).is_some()
    }

    /// 입력을 매칭하고 캡처를 반환합니다. 매칭되지 않으면 `None`입니다.
    ///
    /// 단계 예산은 입력 길이에 비례하므로 긴 필드도 선형 스캔은 끝까지 수행하고,
    /// 조합 폭발하는 백트래킹만 잘립니다.
    pub fn captures(&self, input: &str) -> Option<Captures> {
        let mut spans = Vec::with_capacity(self.segments.len());
        let mut budget =
            BASE_MATCH_STEPS.saturating_add(input.len().saturating_mul(STEPS_PER_BYTE));

        let matched = match (self.partial, self.segments.first()) {
            (false, _) => self.match_from(0, input, 0, &mut spans, &mut budget),
            // 리터럴로 시작하면 출현 위치에서만 시도
            (true, Some(Segment::Literal(lit))) => find_all(input, 0, lit).any(|start| {
                spans.clear();
                self.match_from(0, input, start, &mut spans, &mut budget)
            }),
            (true, _) => input
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(input.len()))
                .any(|start| {
                    spans.clear();
                    self.match_from(0, input, start, &mut spans, &mut budget)
                }),
        };

        if !matched {
            return None;
        }

        let mut captures = Captures::default();
        for (seg_idx, start, end) in spans {
            if let Segment::Capture { name, class } = &self.segments[seg_idx] {
                captures.push(name.as_str(), class.capture_value(&input[start..end]));
            }
        }
        Some(captures)
    }

    /// `seg_idx`번째 세그먼트부터 `pos`에서 매칭을 시도합니다.
    fn match_from(
        &self,
        seg_idx: usize,
        input: &str,
        pos: usize,
        spans: &mut Vec<(usize, usize, usize)>,
        budget: &mut usize,
    ) -> bool {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;

        let Some(segment) = self.segments.get(seg_idx) else {
            return self.partial || pos == input.len();
        };

        match segment {
            Segment::Literal(lit) => {
                input[pos..].starts_with(lit.as_str())
                    && self.match_from(seg_idx + 1, input, pos + lit.len(), spans, budget)
            }
            Segment::Wildcard => match self.segments.get(seg_idx + 1) {
                // 마지막 와일드카드는 나머지 전체를 소비
                None => true,
                // 뒤따르는 리터럴의 출현 위치로 바로 이동
                Some(Segment::Literal(lit)) => find_all(input, pos, lit)
                    .any(|next| self.match_from(seg_idx + 1, input, next, spans, budget)),
                Some(_) => input[pos..]
                    .char_indices()
                    .map(|(i, _)| pos + i)
                    .chain(std::iter::once(input.len()))
                    .any(|next| self.match_from(seg_idx + 1, input, next, spans, budget)),
            },
            Segment::Capture { class, .. } => {
                for end in class.candidates(input, pos) {
                    spans.push((seg_idx, pos, end));
                    if self.match_from(seg_idx + 1, input, end, spans, budget) {
                        return true;
                    }
                    spans.pop();
                }
                false
            }
        }
    }
}

/// `from` 이후 `lit`의 모든 출현 위치 (겹치는 출현 포함)
fn find_all<'a>(input: &'a str, from: usize, lit: &'a str) -> impl Iterator<Item = usize> + 'a {
    let mut cursor = Some(from);
    std::iter::from_fn(move || {
        let at = cursor?;
        let Some(offset) = input[at..].find(lit) else {
            cursor = None;
            return None;
        };
        let hit = at + offset;
        cursor = input[hit..].chars().next().map(|c| hit + c.len_utf8());
        Some(hit)
    })
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn parse_capture(body: &str, pos: usize) -> Result<(String, TokenClass), LogPipelineError> {
    let (name, class) = match body.split_once(':') {
        Some((name, class)) => {
            let class = class
                .trim()
                .parse::<TokenClass>()
                .map_err(|reason| LogPipelineError::PatternCompile {
                    position: pos,
                    reason,
                })?;
            (name.trim(), class)
        }
        None => (body.trim(), TokenClass::Word),
    };

    if !is_valid_capture_name(name) {
        return Err(LogPipelineError::PatternCompile {
            position: pos,
            reason: format!("invalid capture name '{name}'"),
        });
    }

    Ok((name.to_owned(), class))
}

/// 캡처 이름은 `[A-Za-z_][A-Za-z0-9_]*` 형식이어야 합니다.
pub(crate) fn is_valid_capture_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_CAPTURE_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> Template {
        Template::compile(src, false).unwrap()
    }

    #[test]
    fn literal_only_template() {
        let t = compile("request completed");
        assert!(t.is_match("request completed"));
        assert!(!t.is_match("request completed in 5ms"));
        assert!(!t.is_match("a request completed"));
    }

    #[test]
    fn user_status_example() {
        let t = compile("user=<user> status=<code:number>");
        let caps = t.captures("user=alice status=500").unwrap();
        assert_eq!(caps.get("user"), Some("alice"));
        assert_eq!(caps.get("code"), Some("500"));
        assert_eq!(caps.len(), 2);

        assert!(t.captures("user=alice status=five").is_none());
    }

    #[test]
    fn word_capture_backtracks_before_literal() {
        let t = compile("file=<name>.log");
        let caps = t.captures("file=access.2024.log").unwrap();
        assert_eq!(caps.get("name"), Some("access.2024"));
    }

    #[test]
    fn wildcard_matches_any_run() {
        let t = compile("GET * took <ms:number>ms");
        let caps = t.captures("GET /api/v1/users?id=7 took 42ms").unwrap();
        assert_eq!(caps.get("ms"), Some("42"));
        assert!(t.is_match("GET  took 1ms"));
    }

    #[test]
    fn trailing_wildcard_consumes_rest() {
        let t = compile("ERROR *");
        assert!(t.is_match("ERROR disk full"));
        assert!(t.is_match("ERROR "));
        assert!(!t.is_match("WARN disk full"));
    }

    #[test]
    fn partial_template_matches_substring() {
        let t = Template::compile("status=<code:number>", true).unwrap();
        assert!(t.is_partial());
        let caps = t.captures("GET / status=404 bytes=12").unwrap();
        assert_eq!(caps.get("code"), Some("404"));

        let anchored = compile("status=<code:number>");
        assert!(anchored.captures("GET / status=404 bytes=12").is_none());
    }

    #[test]
    fn quoted_capture_is_unescaped() {
        let t = compile("msg=<text:quoted>");
        let caps = t.captures(r#"msg="disk \"sda\" full""#).unwrap();
        assert_eq!(caps.get("text"), Some("disk \"sda\" full"));
    }

    #[test]
    fn ipv4_capture() {
        let t = compile("client <addr:ipv4> connected");
        assert!(t.is_match("client 192.168.1.1 connected"));
        assert!(!t.is_match("client 999.1.1.1 connected"));
    }

    #[test]
    fn ip_capture_accepts_ipv6() {
        let t = compile("from <addr:ip>");
        let caps = t.captures("from 2001:db8::1").unwrap();
        assert_eq!(caps.get("addr"), Some("2001:db8::1"));
    }

    #[test]
    fn any_capture_spans_spaces() {
        let t = compile("<method> <path:any> <code:number>");
        let caps = t.captures("GET /a b/c 200").unwrap();
        assert_eq!(caps.get("method"), Some("GET"));
        assert_eq!(caps.get("path"), Some("/a b/c"));
        assert_eq!(caps.get("code"), Some("200"));
    }

    #[test]
    fn escaped_special_characters_are_literal() {
        let t = compile(r"rate \<\*\> <n:number>");
        assert!(t.is_match("rate <*> 5"));
        assert_eq!(t.capture_names().collect::<Vec<_>>(), vec!["n"]);
    }

    #[test]
    fn compile_errors() {
        assert!(Template::compile("", false).is_err());
        assert!(Template::compile("<open", false).is_err());
        assert!(Template::compile("<n:float>", false).is_err());
        assert!(Template::compile("<>", false).is_err());
        assert!(Template::compile("<1bad>", false).is_err());
        assert!(Template::compile("<a> <a>", false).is_err());
        assert!(Template::compile("trailing\\", false).is_err());
    }

    #[test]
    fn compile_error_reports_position() {
        let err = Template::compile("abc <x:bogus>", false).unwrap_err();
        assert!(matches!(
            err,
            LogPipelineError::PatternCompile { position: 4, .. }
        ));
    }

    #[test]
    fn long_field_matches_partial_literal_template() {
        let input = format!("{} status=404", "x".repeat(150_000));
        let t = Template::compile("status=<code:number>", true).unwrap();
        let caps = t.captures(&input).unwrap();
        assert_eq!(caps.get("code"), Some("404"));
    }

    #[test]
    fn long_field_matches_anchored_wildcard_template() {
        let input = format!("{} status=404", "x".repeat(150_000));
        let caps = compile("* status=<code:number>").captures(&input).unwrap();
        assert_eq!(caps.get("code"), Some("404"));

        // 와일드카드 뒤에 캡처가 오면 위치를 하나씩 시도
        let glued = format!("{}404", "x".repeat(150_000));
        let caps = compile("*<code:number>").captures(&glued).unwrap();
        assert_eq!(caps.get("code"), Some("404"));
    }

    #[test]
    fn overlapping_literal_occurrences_are_tried() {
        let t = Template::compile("aab<n:number>", true).unwrap();
        let caps = t.captures("aaab7").unwrap();
        assert_eq!(caps.get("n"), Some("7"));

        let t = compile("*aab<n:number>");
        assert!(t.is_match("aaaab9"));
    }

    #[test]
    fn pathological_input_terminates() {
        let t = compile("*a*a*a*a*a*a*b");
        let input = "a".repeat(200);
        assert!(!t.is_match(&input));
    }
}
