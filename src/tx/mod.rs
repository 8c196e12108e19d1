//! Batched transaction dispatch: signing, fee quotes, nonce allocation, submission

mod builder;
mod dispatcher;
mod gas;
mod nonce;
mod signer;

pub use builder::{BatchBuilder, TransferTemplate};
pub use dispatcher::{BatchReport, Dispatcher, SubmissionErrorKind};
pub use signer::Signer;

#[cfg(test)]
pub use builder::Batch;
#[cfg(test)]
pub use gas::FeeQuote;
