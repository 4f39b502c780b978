use crate::error::{AppError, AppResult, ConfigError};
use crate::models::request::{AnalysisRequest, DocumentUpload};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 批量清单
#[derive(Debug, Clone, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub documents: Vec<ManifestEntry>,
}

/// 清单中的一个待分析文档
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// 文档路径，相对路径以清单所在目录为基准
    pub path: PathBuf,
    pub doc_type_id: String,
    pub model_id: String,
    #[serde(default)]
    pub context_text: String,
    /// 不填时按扩展名推断
    pub content_type: Option<String>,
}

/// 从 TOML 文件加载批量清单
pub async fn load_manifest(manifest_path: &Path) -> AppResult<BatchManifest> {
    let content = fs::read_to_string(manifest_path)
        .await
        .map_err(|e| AppError::io(manifest_path.display().to_string(), e))?;

    let manifest: BatchManifest = toml::from_str(&content).map_err(ConfigError::from)?;

    Ok(manifest)
}

/// 读取清单条目对应的文件并转换为分析请求
pub async fn load_request(entry: &ManifestEntry, base_dir: &Path) -> AppResult<AnalysisRequest> {
    let path = if entry.path.is_absolute() {
        entry.path.clone()
    } else {
        base_dir.join(&entry.path)
    };

    let bytes = fs::read(&path)
        .await
        .map_err(|e| AppError::io(path.display().to_string(), e))?;

    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let content_type = entry
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&path));

    tracing::info!("正在加载: {} ({} 字节)", file_name, bytes.len());

    Ok(AnalysisRequest::new(
        DocumentUpload::new(file_name, content_type, bytes),
        entry.doc_type_id.clone(),
        entry.model_id.clone(),
        entry.context_text.clone(),
    ))
}

/// 按扩展名推断 MIME 类型，无法识别时为 application/octet-stream
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manifest_entries_resolve_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tender.pdf"), b"%PDF-1.4").unwrap();
        let manifest_path = dir.path().join("batch.toml");
        std::fs::write(
            &manifest_path,
            r#"
            [[documents]]
            path = "tender.pdf"
            doc_type_id = "tender"
            model_id = "gemini-pro"
            context_text = "优先考虑节能指标"
            "#,
        )
        .unwrap();

        let manifest = load_manifest(&manifest_path).await.unwrap();
        assert_eq!(manifest.documents.len(), 1);

        let request = load_request(&manifest.documents[0], dir.path()).await.unwrap();
        assert_eq!(request.document.file_name, "tender.pdf");
        assert_eq!(request.document.content_type, "application/pdf");
        assert_eq!(request.document.bytes, b"%PDF-1.4");
        assert_eq!(request.context_text, "优先考虑节能指标");
    }

    #[tokio::test]
    async fn test_missing_document_is_an_io_error() {
        let entry = ManifestEntry {
            path: PathBuf::from("nope.pdf"),
            doc_type_id: "tender".to_string(),
            model_id: "m".to_string(),
            context_text: String::new(),
            content_type: None,
        };
        let err = load_request(&entry, Path::new("/nonexistent")).await.unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("scan.tiff")), "image/tiff");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_guess_content_type_covers_common_scan_formats() {
        assert_eq!(guess_content_type(Path::new("scan.bmp")), "image/bmp");
        assert_eq!(guess_content_type(Path::new("scan.gif")), "image/gif");
        assert_eq!(guess_content_type(Path::new("page.webp")), "image/webp");
        assert_eq!(guess_content_type(Path::new("legacy.doc")), "application/msword");
        assert_eq!(
            guess_content_type(Path::new("sheet.xlsx")),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }
}
