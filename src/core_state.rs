//! Application state shared by every HTTP request.
//!
//! Built once at startup from `AppConfig`. Everything inside is immutable
//! after construction: the classifier handle, the explainer, the external
//! service clients and the symptom catalog. Requests only read it.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::llm::{self, ChatBackend};
use crate::pipeline::classify::{self, ClassificationError, Classifier};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::explain::{ExplainConfig, ExplanationError, LimeExplainer};
use crate::pipeline::orchestrator::DiagnosisPipeline;
use crate::pipeline::preprocess::Preprocessor;
use crate::reference::{
    CommandSpeechEngine, DisabledSpeech, LookupError, SpeechSynthesizer, WikipediaClient,
};
use crate::symptoms::SymptomCatalog;

/// Failures that stop the process before it serves anything.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier could not be loaded: {0}")]
    Classifier(#[from] ClassificationError),

    #[error("Explainer configuration rejected: {0}")]
    Explainer(#[from] ExplanationError),

    #[error("Encyclopedia client could not be built: {0}")]
    Encyclopedia(#[from] LookupError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: AppConfig,
    pub pipeline: DiagnosisPipeline,
    pub chat: Arc<dyn ChatBackend>,
    pub catalog: &'static SymptomCatalog,
    started_at: Instant,
}

impl CoreState {
    /// Assemble state from already-built components.
    pub fn new(config: AppConfig, pipeline: DiagnosisPipeline, chat: Arc<dyn ChatBackend>) -> Self {
        Self {
            config,
            pipeline,
            chat,
            catalog: SymptomCatalog::standard(),
            started_at: Instant::now(),
        }
    }

    /// Production wiring. Classifier load failure is fatal.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let model = classify::load_model(&config.classifier_path)?;
        let classifier = Classifier::new(model);
        tracing::info!(
            path = %config.classifier_path.display(),
            backend = classifier.backend(),
            "Classifier loaded"
        );

        let explainer = LimeExplainer::new(ExplainConfig::from_settings(&config.explainer))?;
        let encyclopedia = WikipediaClient::new(&config.wikipedia_url, config.http_timeout_secs)?;
        let speech = speech_from_config(&config);

        let preprocessor = if config.exif_orientation {
            Preprocessor::with_exif_orientation()
        } else {
            Preprocessor::standard()
        };

        let pipeline = DiagnosisPipeline::new(
            preprocessor,
            classifier,
            Box::new(explainer),
            Arc::new(encyclopedia),
            speech,
            DiagnosticDump::new(config.dump_dir.clone()),
        );
        let chat = llm::backend_from_config(&config);

        Ok(Self::new(config, pipeline, chat))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn speech_from_config(config: &AppConfig) -> Arc<dyn SpeechSynthesizer> {
    if !config.speech_enabled {
        tracing::info!("Speech disabled by configuration");
        return Arc::new(DisabledSpeech);
    }
    match CommandSpeechEngine::from_command_line(&config.speech_command) {
        Some(engine) => {
            tracing::info!(program = engine.program(), "Speech engine configured");
            Arc::new(engine)
        }
        None => {
            tracing::warn!("Empty speech command, speech disabled");
            Arc::new(DisabledSpeech)
        }
    }
}
