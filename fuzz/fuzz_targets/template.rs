#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logharvest_log_pipeline::rule::Template;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 패턴 템플릿 원문
    pattern: String,
    /// 부분 매칭 허용 여부
    partial: bool,
    /// 매칭 대상 필드값
    input: String,
}

fuzz_target!(|input: FuzzInput| {
    // 컴파일 실패는 정상 결과
    let Ok(template) = Template::compile(&input.pattern, input.partial) else {
        return;
    };

    if let Some(captures) = template.captures(&input.input) {
        for (name, value) in captures.iter() {
            assert!(!name.is_empty());
            assert!(value.len() <= input.input.len());
        }
    }
});
