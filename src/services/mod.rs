mod archiver;
mod mailer;
mod template;

pub use archiver::Archiver;
pub use mailer::{Mailer, OutgoingMail, SmtpMailer};
pub use template::{strip_code_fences, DigestTemplate};

#[cfg(test)]
pub(crate) use mailer::tests::CapturingMailer;
