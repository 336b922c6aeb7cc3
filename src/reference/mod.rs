//! External reference services used after a diagnosis: the encyclopedia
//! summary of the predicted condition and its spoken playback.

pub mod encyclopedia;
pub mod speech;

pub use encyclopedia::{
    fallback_text, first_sentences, tumor_information, EncyclopediaLookup, LookupError,
    MockEncyclopedia, WikipediaClient,
};
pub use speech::{
    speak_reported, CommandSpeechEngine, DisabledSpeech, RecordingSpeech, SpeechError,
    SpeechStatus, SpeechSynthesizer,
};
