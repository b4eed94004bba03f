mod curator;
mod gemini;
mod retry;

pub use curator::{check_output, Curator, OutputValidation};
pub use gemini::{GeminiClient, GenerativeModel};
pub use retry::{RetryPolicy, TokioSleeper};

#[cfg(test)]
pub(crate) use curator::tests::{well_formed_digest, ScriptedModel};
#[cfg(test)]
pub(crate) use retry::tests::RecordingSleeper;
