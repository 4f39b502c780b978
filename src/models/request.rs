/// 待分析的文档
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// 一次分析请求
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub document: DocumentUpload,
    /// 文档类型，决定提取 skill 和提示词模板
    pub doc_type_id: String,
    /// 生成模型
    pub model_id: String,
    /// 人工补充的上下文，填入模板的 `manual_rag_text`
    pub context_text: String,
}

impl AnalysisRequest {
    pub fn new(
        document: DocumentUpload,
        doc_type_id: impl Into<String>,
        model_id: impl Into<String>,
        context_text: impl Into<String>,
    ) -> Self {
        Self {
            document,
            doc_type_id: doc_type_id.into(),
            model_id: model_id.into(),
            context_text: context_text.into(),
        }
    }
}
