pub mod extraction_client;
pub mod gemini_client;
pub mod generation;
pub mod llm_client;

pub use extraction_client::{
    DocumentExtractor, ExtractionClient, ExtractionCredentials, PollSettings,
};
pub use gemini_client::{parse_direct_response, DirectGenerationGenerator};
pub use generation::{
    parse_json_text, GenerationClient, GenerationCredentials, GeneratorFactory,
    ProviderGeneratorFactory,
};
pub use llm_client::ChatCompletionGenerator;
