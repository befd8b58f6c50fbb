pub mod factory;
pub mod unkey;
pub mod verifier;

pub use factory::build_key_verifier;
pub use unkey::{UnkeyClient, UnkeySetupError};
pub use verifier::{
    Credential, KeyVerifier, Verdict, VerificationRequest, VerificationResult, VerifyError,
};
