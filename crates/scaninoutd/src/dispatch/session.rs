//! Per-connection authentication state.

use scaninout_proto::AuthKey;
use scaninout_proto::CommandError;
use scaninout_proto::auth::{self, NONCE_BYTES};
use scaninout_proto::envelope::ids;

#[derive(Debug, Default)]
enum Handshake {
    /// No live nonce.
    #[default]
    Unarmed,
    /// A nonce has been issued; `signature` is set once preloaded.
    Armed {
        nonce: [u8; NONCE_BYTES],
        signature: Option<Vec<u8>>,
    },
}

/// State owned by one connection.
///
/// A privileged request is admitted only when the connection holds a nonce
/// and a preloaded signature over `nonce || raw request line`. Any check,
/// successful or not, consumes the handshake, so every privileged call needs
/// a fresh `GenerateNonce` and `PreloadSignature`.
#[derive(Debug, Default)]
pub struct Session {
    handshake: Handshake,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a nonce is live.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.handshake, Handshake::Armed { .. })
    }

    /// Issues a fresh nonce, discarding any earlier nonce and signature.
    pub fn arm(&mut self) -> [u8; NONCE_BYTES] {
        self.arm_with(auth::generate_nonce())
    }

    pub(crate) fn arm_with(&mut self, nonce: [u8; NONCE_BYTES]) -> [u8; NONCE_BYTES] {
        self.handshake = Handshake::Armed {
            nonce,
            signature: None,
        };
        nonce
    }

    /// Stores the signature for the next privileged request.
    ///
    /// # Errors
    ///
    /// Returns a `no-nonce` error when no nonce has been issued.
    pub fn preload(&mut self, signature: Vec<u8>) -> Result<(), CommandError> {
        match &mut self.handshake {
            Handshake::Armed { signature: slot, .. } => {
                *slot = Some(signature);
                Ok(())
            }
            Handshake::Unarmed => Err(CommandError::new(
                ids::NO_NONCE,
                "No nonce has been generated.",
            )),
        }
    }

    /// Admits a privileged request whose raw bytes are `line`.
    ///
    /// # Errors
    ///
    /// `forbidden` without a nonce and signature, `invalid-signature` when the
    /// signature does not match. The handshake is consumed in both the
    /// mismatch and the success case.
    pub fn check(&mut self, key: &AuthKey, line: &[u8]) -> Result<(), CommandError> {
        let Handshake::Armed {
            nonce,
            signature: Some(signature),
        } = &self.handshake
        else {
            return Err(CommandError::forbidden());
        };
        let valid = key.verify(nonce, line, signature);
        self.handshake = Handshake::Unarmed;
        if valid {
            Ok(())
        } else {
            Err(CommandError::invalid_signature())
        }
    }
}
