//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 경로가 파일이면 해당 파일 하나를, 디렉토리면 그 안의 `.yml`/`.yaml` 파일을
//! 파일 이름 순서로 읽어 하나의 [`RuleSet`]으로 병합합니다.
//! 디렉토리 모드에서 개별 파일 파싱 실패는 경고 로그를 남기고 건너뜁니다.

use std::path::{Path, PathBuf};

use crate::error::LogPipelineError;

use super::types::RuleSet;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 파일 또는 디렉토리에서 규칙을 로드합니다.
    pub async fn load_path(path: impl AsRef<Path>) -> Result<RuleSet, LogPipelineError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            Self::load_file(path).await
        }
    }

    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// `.yml` 또는 `.yaml` 확장자를 가진 파일만 파일 이름 순서로 처리합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<RuleSet, LogPipelineError> {
        let dir = dir.as_ref();

        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|e| LogPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| LogPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();

            // .yml / .yaml 확장자만 처리
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");

            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut rules = RuleSet::default();
        for path in paths {
            match Self::load_file(&path).await {
                Ok(set) => rules.merge(set),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(LogPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            counters = rules.counters.len(),
            gauges = rules.gauges.len(),
            histograms = rules.histograms.len(),
            "loaded metric rules"
        );

        Ok(rules)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleSet, LogPipelineError> {
        let path = path.as_ref();

        // 파일 크기 검증
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LogPipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하여 규칙 집합을 생성합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleSet, LogPipelineError> {
        // 빈 문서는 빈 규칙 집합
        if yaml_str.trim().is_empty() {
            return Ok(RuleSet::default());
        }

        let rules: RuleSet =
            serde_yaml::from_str(yaml_str).map_err(|e| LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if rules.len() > MAX_RULES_COUNT {
            return Err(LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        // 유효성 검증
        rules.validate()?;

        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER_YAML: &str = r#"
counters:
  - name: requests.completed
    pattern: "request completed"
"#;

    const GAUGE_YAML: &str = r#"
gauges:
  - name: queue.depth
    pattern: "depth=<d:number>"
    value: d
"#;

    #[test]
    fn parse_valid_yaml() {
        let rules = RuleLoader::parse_yaml(COUNTER_YAML, "test.yml").unwrap();
        assert_eq!(rules.counters.len(), 1);
        assert_eq!(rules.counters[0].name, "requests.completed");
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let yaml = "not: [valid: yaml: {{{";
        let result = RuleLoader::parse_yaml(yaml, "bad.yml");
        assert!(result.is_err());
    }

    #[test]
    fn parse_yaml_runs_validation() {
        let yaml = r#"
gauges:
  - name: no.value
    pattern: "x=<x:number>"
"#;
        let err = RuleLoader::parse_yaml(yaml, "gauge.yml").unwrap_err();
        assert!(matches!(err, LogPipelineError::RuleValidation { .. }));
    }

    #[test]
    fn parse_empty_document() {
        assert!(RuleLoader::parse_yaml("  \n", "empty.yml").unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_nonexistent_path_returns_error() {
        let result = RuleLoader::load_path("/nonexistent/path/rules").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        std::fs::write(&path, COUNTER_YAML).unwrap();

        let rules = RuleLoader::load_path(&path).await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[tokio::test]
    async fn load_directory_merges_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20-gauges.yaml"), GAUGE_YAML).unwrap();
        std::fs::write(dir.path().join("10-counters.yml"), COUNTER_YAML).unwrap();
        std::fs::write(
            dir.path().join("30-more.yml"),
            "counters:\n  - name: second\n    pattern: second\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rules = RuleLoader::load_path(dir.path()).await.unwrap();
        assert_eq!(rules.counters.len(), 2);
        assert_eq!(rules.counters[0].name, "requests.completed");
        assert_eq!(rules.counters[1].name, "second");
        assert_eq!(rules.gauges.len(), 1);
    }

    #[tokio::test]
    async fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.yml"), COUNTER_YAML).unwrap();
        std::fs::write(dir.path().join("bad.yml"), "counters: [[[").unwrap();

        let rules = RuleLoader::load_directory(dir.path()).await.unwrap();
        assert_eq!(rules.len(), 1);
    }
}
