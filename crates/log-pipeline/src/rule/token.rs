//! 토큰 인식기 -- 단어, 숫자, 인용 문자열, IPv4/IPv6 주소
//!
//! 각 인식기는 입력의 `start` 위치에서 시작하는 토큰이 끝날 수 있는
//! 바이트 위치 후보를 길이가 긴 순서로 반환합니다. 템플릿 매처는 이 후보를
//! 순서대로 시도하며 백트래킹합니다.
//!
//! 숫자와 주소 토큰은 숫자(IPv6은 16진수) 바로 앞에서 끝나지 않습니다.
//! 따라서 `999.1.1.1`은 `99.1.1.1`로 잘려 인식되지 않습니다.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 캡처 토큰 클래스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    /// 영숫자, `_`, `-`, `.`로 이루어진 단어
    Word,
    /// 부호 없는 십진수 (`digits[.digits][(e|E)[-]digits]` 또는 `.digits[...]`)
    Number,
    /// 작은/큰따옴표 문자열 (이스케이프 지원)
    Quoted,
    /// 점으로 구분된 IPv4 주소
    Ipv4,
    /// 콜론으로 구분된 IPv6 주소 (`::` 생략 지원)
    Ipv6,
    /// IPv4 또는 IPv6
    Ip,
    /// 임의의 비어 있지 않은 문자열
    Any,
}

impl TokenClass {
    /// `start`에서 시작하는 토큰의 끝 위치 후보 (긴 것부터)
    pub fn candidates(self, input: &str, start: usize) -> Vec<usize> {
        match self {
            Self::Word => word_ends(input, start),
            Self::Number => number_ends(input, start),
            Self::Quoted => quoted_end(input, start).into_iter().collect(),
            Self::Ipv4 => ipv4_ends(input, start),
            Self::Ipv6 => ipv6_ends(input, start),
            Self::Ip => {
                let mut ends = ipv6_ends(input, start);
                ends.extend(ipv4_ends(input, start));
                ends.sort_unstable_by(|a, b| b.cmp(a));
                ends.dedup();
                ends
            }
            Self::Any => any_ends(input, start),
        }
    }

    /// 매칭된 토큰 텍스트를 캡처 값으로 변환합니다.
    ///
    /// 인용 문자열은 따옴표를 벗기고 이스케이프를 해제합니다.
    pub fn capture_value(self, token: &str) -> Cow<'_, str> {
        match self {
            Self::Quoted => unquote(token),
            _ => Cow::Borrowed(token),
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Word => "word",
            Self::Number => "number",
            Self::Quoted => "quoted",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Ip => "ip",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

impl FromStr for TokenClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "word" => Ok(Self::Word),
            "number" => Ok(Self::Number),
            "quoted" => Ok(Self::Quoted),
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            "ip" => Ok(Self::Ip),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown token class '{other}'")),
        }
    }
}

/// 전체 문자열이 해당 클래스의 토큰 하나인지 확인합니다.
pub fn is_token(class: TokenClass, input: &str) -> bool {
    !input.is_empty() && class.candidates(input, 0).first() == Some(&input.len())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn word_ends(input: &str, start: usize) -> Vec<usize> {
    let mut ends: Vec<usize> = input[start..]
        .char_indices()
        .take_while(|(_, c)| is_word_char(*c))
        .map(|(i, c)| start + i + c.len_utf8())
        .collect();
    ends.reverse();
    ends
}

fn any_ends(input: &str, start: usize) -> Vec<usize> {
    let mut ends: Vec<usize> = input[start..]
        .char_indices()
        .map(|(i, c)| start + i + c.len_utf8())
        .collect();
    ends.reverse();
    ends
}

/// `pos`부터 연속된 ASCII 숫자의 끝 위치
fn digit_run(bytes: &[u8], pos: usize) -> usize {
    let mut end = pos;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

fn followed_by_digit(bytes: &[u8], end: usize) -> bool {
    bytes.get(end).is_some_and(u8::is_ascii_digit)
}

fn number_ends(input: &str, start: usize) -> Vec<usize> {
    let bytes = input.as_bytes();
    let mut ends = Vec::new();

    // 정수부
    let int_end = digit_run(bytes, start);
    let mut mantissa_end = None;
    if int_end > start {
        ends.push(int_end);
        mantissa_end = Some(int_end);
    }

    // 소수부: 정수부가 있으면 선택, 없으면 `.digits` 형태가 필수
    if bytes.get(int_end) == Some(&b'.') {
        let frac_end = digit_run(bytes, int_end + 1);
        if frac_end > int_end + 1 {
            ends.push(frac_end);
            mantissa_end = Some(frac_end);
        }
    }

    // 지수부
    if let Some(m_end) = mantissa_end
        && matches!(bytes.get(m_end), Some(b'e' | b'E'))
    {
        let mut exp_start = m_end + 1;
        if bytes.get(exp_start) == Some(&b'-') {
            exp_start += 1;
        }
        let exp_end = digit_run(bytes, exp_start);
        if exp_end > exp_start {
            ends.push(exp_end);
        }
    }

    ends.retain(|&end| !followed_by_digit(bytes, end));
    ends.reverse();
    ends
}

fn quoted_end(input: &str, start: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let quote = *bytes.get(start)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn unquote(token: &str) -> Cow<'_, str> {
    if token.len() < 2 {
        return Cow::Borrowed(token);
    }
    let inner = &token[1..token.len() - 1];
    if !inner.contains('\\') {
        return Cow::Borrowed(inner);
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// 옥텟 후보 끝 위치: `0` 또는 `[1-9][0-9]{0,2}` 이면서 255 이하
fn octet_ends(bytes: &[u8], pos: usize) -> Vec<usize> {
    match bytes.get(pos) {
        Some(b'0') => vec![pos + 1],
        Some(b'1'..=b'9') => {
            let mut ends = Vec::with_capacity(3);
            let mut value: u32 = 0;
            for (i, b) in bytes[pos..].iter().take(3).enumerate() {
                if !b.is_ascii_digit() {
                    break;
                }
                value = value * 10 + u32::from(b - b'0');
                if value <= 255 {
                    ends.push(pos + i + 1);
                }
            }
            ends
        }
        _ => Vec::new(),
    }
}

fn ipv4_ends(input: &str, start: usize) -> Vec<usize> {
    let bytes = input.as_bytes();
    let mut frontier = vec![start];

    for octet in 0..4 {
        let mut next = Vec::new();
        for pos in frontier {
            let pos = if octet == 0 {
                pos
            } else if bytes.get(pos) == Some(&b'.') {
                pos + 1
            } else {
                continue;
            };
            next.extend(octet_ends(bytes, pos));
        }
        if next.is_empty() {
            return Vec::new();
        }
        frontier = next;
    }

    frontier.retain(|&end| !followed_by_digit(bytes, end));
    frontier.sort_unstable_by(|a, b| b.cmp(a));
    frontier.dedup();
    frontier
}

fn hex_group_end(bytes: &[u8], pos: usize) -> usize {
    let mut end = pos;
    while end < bytes.len() && end - pos < 4 && bytes[end].is_ascii_hexdigit() {
        end += 1;
    }
    end
}

fn ipv6_ends(input: &str, start: usize) -> Vec<usize> {
    let bytes = input.as_bytes();
    let mut ends = Vec::new();
    let mut pos = start;
    let mut groups = 0usize;
    let mut compressed = false;

    // 선행 `::`
    if bytes[start..].starts_with(b"::") {
        compressed = true;
        pos += 2;
        ends.push(pos);
    }

    loop {
        let group_end = hex_group_end(bytes, pos);
        let max_groups = if compressed { 7 } else { 8 };
        if group_end == pos || groups == max_groups {
            break;
        }
        groups += 1;
        pos = group_end;
        if compressed || groups == 8 {
            ends.push(pos);
        }

        if bytes[pos..].starts_with(b"::") {
            if compressed {
                break;
            }
            compressed = true;
            pos += 2;
            if groups <= 7 {
                ends.push(pos);
            }
        } else if bytes.get(pos) == Some(&b':') {
            pos += 1;
        } else {
            break;
        }
    }

    ends.retain(|&end| !bytes.get(end).is_some_and(u8::is_ascii_hexdigit));
    ends.sort_unstable_by(|a, b| b.cmp(a));
    ends.dedup();
    ends
}
