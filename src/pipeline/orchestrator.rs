//! Diagnosis orchestrator.
//!
//! Single entry point that drives the full image pipeline:
//! validate → preprocess → classify → explain → look up → speak → (dump).
//!
//! The first three stages short-circuit: a failure ends the request with a
//! typed error. From the explanation on, every stage is best-effort and its
//! failure is recorded in the report instead.
//!
//! Uses trait-based DI for all collaborators (TumorModel, Explainer,
//! EncyclopediaLookup, SpeechSynthesizer) so the orchestrator stays testable
//! with mocks.

use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use uuid::Uuid;

use crate::models::PredictionResult;
use crate::pipeline::classify::{ClassificationError, Classifier};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::explain::{ExplanationOverlay, Explainer, SegmentWeight};
use crate::pipeline::preprocess::{encode_png, PreprocessError, Preprocessor};
use crate::pipeline::validation::{UploadKind, ValidationError, Validator};
use crate::reference::{speak_reported, tumor_information, EncyclopediaLookup, SpeechStatus, SpeechSynthesizer};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures that end a diagnosis request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Upload rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassificationError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Everything one diagnosis produced.
#[derive(Debug, Clone)]
pub struct DiagnosisReport {
    pub request_id: Uuid,
    pub upload_kind: UploadKind,
    pub original_width: u32,
    pub original_height: u32,
    /// Model-input image (150×150 RGB).
    pub preprocessed: RgbImage,
    pub prediction: PredictionResult,
    /// Populated only if the explanation succeeded.
    pub explanation: Option<ExplanationOverlay>,
    /// Why the explanation is missing.
    pub explanation_error: Option<String>,
    pub tumor_information: String,
    pub speech: SpeechStatus,
}

#[derive(Serialize)]
struct UploadInfo<'a> {
    extension: &'a str,
    kind: UploadKind,
    size_bytes: usize,
    original_width: u32,
    original_height: u32,
}

#[derive(Serialize)]
struct ExplanationInfo<'a> {
    category: &'a str,
    selected_segments: &'a [usize],
    segment_weights: &'a [SegmentWeight],
    intercept: f64,
    score: f64,
    num_segments: usize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct DiagnosisPipeline {
    validator: Validator,
    preprocessor: Preprocessor,
    classifier: Classifier,
    explainer: Box<dyn Explainer>,
    encyclopedia: Arc<dyn EncyclopediaLookup>,
    speech: Arc<dyn SpeechSynthesizer>,
    dump: DiagnosticDump,
}

impl DiagnosisPipeline {
    pub fn new(
        preprocessor: Preprocessor,
        classifier: Classifier,
        explainer: Box<dyn Explainer>,
        encyclopedia: Arc<dyn EncyclopediaLookup>,
        speech: Arc<dyn SpeechSynthesizer>,
        dump: DiagnosticDump,
    ) -> Self {
        Self {
            validator: Validator::new(),
            preprocessor,
            classifier,
            explainer,
            encyclopedia,
            speech,
            dump,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Full pipeline over one upload.
    pub fn run(&self, bytes: &[u8], extension: &str) -> Result<DiagnosisReport, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("diagnosis", %request_id);
        let _guard = span.enter();

        // Step 1: Validate
        let upload = self.validator.check(bytes, extension)?;

        // Step 2: Preprocess
        let prepared = self.preprocessor.prepare(&upload, bytes)?;
        tracing::debug!(kind = ?upload.kind(), "Upload preprocessed");

        // Step 3: Classify
        let prediction = self.classifier.classify(prepared.tensor.view()).map_err(|e| {
            tracing::error!(error = %e, "Classification failed, skipping remaining stages");
            e
        })?;
        tracing::info!(
            category = %prediction.category,
            confidence = prediction.confidence,
            "Upload classified"
        );

        // Step 4: Explain (non-fatal)
        let (explanation, explanation_error) =
            match self.explainer.explain(&prepared.image, &self.classifier) {
                Ok(overlay) => (Some(overlay), None),
                Err(e) => {
                    tracing::warn!(error = %e, "Explanation failed, continuing without overlay");
                    (None, Some(e.to_string()))
                }
            };

        // Step 5: Look up and speak (never fail)
        let information = tumor_information(self.encyclopedia.as_ref(), prediction.category.as_str());
        let speech = speak_reported(self.speech.as_ref(), &information);

        let report = DiagnosisReport {
            request_id,
            upload_kind: upload.kind(),
            original_width: prepared.original_width,
            original_height: prepared.original_height,
            preprocessed: prepared.image,
            prediction,
            explanation,
            explanation_error,
            tumor_information: information,
            speech,
        };

        self.write_dump(&report, upload.extension.to_string().as_str(), bytes.len());
        Ok(report)
    }

    fn write_dump(&self, report: &DiagnosisReport, extension: &str, size_bytes: usize) {
        let Some(mut dump) = self.dump.for_request(&report.request_id) else {
            return;
        };

        dump.json(
            "00-upload-info.json",
            &UploadInfo {
                extension,
                kind: report.upload_kind,
                size_bytes,
                original_width: report.original_width,
                original_height: report.original_height,
            },
        );
        match encode_png(&report.preprocessed) {
            Ok(png) => dump.bytes("01-preprocessed.png", &png),
            Err(e) => tracing::warn!(error = %e, "Diagnostic dump: preprocessed image not encoded"),
        }
        dump.json("02-prediction.json", &report.prediction);
        if let Some(ref overlay) = report.explanation {
            match overlay.to_png() {
                Ok(png) => dump.bytes("03-overlay.png", &png),
                Err(e) => tracing::warn!(error = %e, "Diagnostic dump: overlay not encoded"),
            }
            dump.json(
                "03-explanation.json",
                &ExplanationInfo {
                    category: overlay.category.as_str(),
                    selected_segments: &overlay.selected_segments,
                    segment_weights: &overlay.segment_weights,
                    intercept: overlay.intercept,
                    score: overlay.score,
                    num_segments: overlay.num_segments,
                },
            );
        }
        dump.text("04-tumor-information.txt", &report.tumor_information);
        dump.finish();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TumorCategory;
    use crate::pipeline::classify::MockTumorModel;
    use crate::pipeline::explain::{ExplainConfig, ExplanationError, LimeExplainer};
    use crate::pipeline::validation::test_images::{jpeg, png};
    use crate::reference::{LookupError, MockEncyclopedia, RecordingSpeech, SpeechError};

    struct FailingExplainer;

    impl Explainer for FailingExplainer {
        fn explain(&self, _: &RgbImage, _: &Classifier) -> Result<ExplanationOverlay, ExplanationError> {
            Err(ExplanationError::Segmentation("no segments".into()))
        }
    }

    fn quick_explainer() -> Box<dyn Explainer> {
        Box::new(
            LimeExplainer::new(ExplainConfig {
                num_samples: 20,
                seed: Some(3),
                ..ExplainConfig::default()
            })
            .unwrap(),
        )
    }

    struct Fixture {
        model: Arc<MockTumorModel>,
        speech: Arc<RecordingSpeech>,
    }

    fn pipeline_with(
        model: MockTumorModel,
        explainer: Box<dyn Explainer>,
        encyclopedia: MockEncyclopedia,
        speech: RecordingSpeech,
        dump: DiagnosticDump,
    ) -> (DiagnosisPipeline, Fixture) {
        let model = Arc::new(model);
        let speech = Arc::new(speech);
        let pipeline = DiagnosisPipeline::new(
            Preprocessor::standard(),
            Classifier::new(model.clone()),
            explainer,
            Arc::new(encyclopedia),
            speech.clone(),
            dump,
        );
        (pipeline, Fixture { model, speech })
    }

    fn glioma_model() -> MockTumorModel {
        MockTumorModel::fixed(vec![0.7, 0.1, 0.1, 0.1])
    }

    #[test]
    fn full_run_produces_every_artifact() {
        let (pipeline, fx) = pipeline_with(
            glioma_model(),
            quick_explainer(),
            MockEncyclopedia::new("A glioma is a tumor. It starts in glial cells. More."),
            RecordingSpeech::new(),
            DiagnosticDump::disabled(),
        );
        let report = pipeline.run(&png(64, 48), "png").unwrap();

        assert_eq!(report.prediction.category, TumorCategory::Glioma);
        assert!((report.prediction.confidence - 0.7).abs() < 1e-6);
        assert_eq!((report.original_width, report.original_height), (64, 48));
        assert_eq!(report.preprocessed.dimensions(), (150, 150));
        assert!(report.explanation.is_some());
        assert!(report.explanation_error.is_none());
        assert_eq!(
            report.tumor_information,
            "A glioma is a tumor. It starts in glial cells."
        );
        assert_eq!(report.speech, SpeechStatus::Spoken);
        assert_eq!(fx.speech.spoken(), vec![report.tumor_information.clone()]);
    }

    #[test]
    fn explainer_failure_still_runs_lookup_and_speech() {
        let (pipeline, fx) = pipeline_with(
            glioma_model(),
            Box::new(FailingExplainer),
            MockEncyclopedia::new("Glioma text."),
            RecordingSpeech::new(),
            DiagnosticDump::disabled(),
        );
        let report = pipeline.run(&jpeg(32, 32), "jpg").unwrap();

        assert!(report.explanation.is_none());
        assert!(report.explanation_error.unwrap().contains("no segments"));
        assert_eq!(report.prediction.category, TumorCategory::Glioma);
        assert_eq!(report.tumor_information, "Glioma text.");
        assert_eq!(fx.speech.spoken(), vec!["Glioma text."]);
    }

    #[test]
    fn classifier_failure_skips_everything_else() {
        let (pipeline, fx) = pipeline_with(
            MockTumorModel::failing("session crashed"),
            quick_explainer(),
            MockEncyclopedia::new("unused"),
            RecordingSpeech::new(),
            DiagnosticDump::disabled(),
        );
        let err = pipeline.run(&png(20, 20), "png").unwrap_err();

        assert!(matches!(err, PipelineError::Classification(_)));
        assert_eq!(fx.model.calls(), 1);
        assert!(fx.speech.spoken().is_empty());
    }

    #[test]
    fn rejected_upload_never_reaches_the_model() {
        let (pipeline, fx) = pipeline_with(
            glioma_model(),
            quick_explainer(),
            MockEncyclopedia::new("unused"),
            RecordingSpeech::new(),
            DiagnosticDump::disabled(),
        );
        let err = pipeline.run(b"not an image at all", "png").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ValidationError::Undecodable { .. })));

        let err = pipeline.run(&png(8, 8), "gif").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::UnsupportedExtension(_))
        ));
        assert_eq!(fx.model.calls(), 0);
    }

    #[test]
    fn lookup_and_speech_failures_are_reported() {
        let (pipeline, _) = pipeline_with(
            MockTumorModel::fixed(vec![0.1, 0.1, 0.1, 0.7]),
            Box::new(FailingExplainer),
            MockEncyclopedia::failing(LookupError::Ambiguous("pituitary".into())),
            RecordingSpeech::failing(SpeechError::EmptyText),
            DiagnosticDump::disabled(),
        );
        let report = pipeline.run(&png(16, 16), "PNG").unwrap();

        assert_eq!(
            report.tumor_information,
            "Multiple results found for pituitary. Please specify further."
        );
        assert!(matches!(report.speech, SpeechStatus::Failed { .. }));
    }

    #[test]
    fn dump_writes_artifacts_per_request() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline_with(
            glioma_model(),
            quick_explainer(),
            MockEncyclopedia::new("Glioma text."),
            RecordingSpeech::new(),
            DiagnosticDump::new(Some(tmp.path().to_path_buf())),
        );
        let report = pipeline.run(&png(24, 24), "png").unwrap();

        let dir = tmp.path().join(report.request_id.to_string());
        for file in [
            "00-upload-info.json",
            "01-preprocessed.png",
            "02-prediction.json",
            "03-overlay.png",
            "03-explanation.json",
            "04-tumor-information.txt",
        ] {
            assert!(dir.join(file).exists(), "missing {file}");
        }
        let prediction = std::fs::read_to_string(dir.join("02-prediction.json")).unwrap();
        assert!(prediction.contains("\"glioma\""));
    }
}
