//! Upstream service clients and the recognition orchestrator

pub mod audd;
pub mod gemini;
pub mod media_fetcher;
pub mod recognizer;
pub mod spotify;

pub use audd::AuddClient;
pub use gemini::GeminiClient;
pub use media_fetcher::YtDlpFetcher;
pub use recognizer::{Recognizer, RecognizerConfig, ScratchAudio};
pub use spotify::SpotifyClient;
