//! Signed envelope wire format produced by [`crate::KeypairSigner`].
//!
//! ```text
//! signature   64 bytes  Ed25519 over everything that follows
//! payer_len   u16 LE
//! payer       payer_len bytes (UTF-8 account id)
//! token_len   u16 LE
//! token       token_len bytes (UTF-8 liveness token hash)
//! cu_limit    u32 LE    compute-unit limit, 0 when unset
//! payload     rest      opaque operation payload
//! ```

use thiserror::Error;

pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope truncated")]
    Truncated,

    #[error("field too long: {0} bytes")]
    FieldTooLong(usize),

    #[error("field is not valid UTF-8")]
    InvalidUtf8,
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub signature: [u8; SIGNATURE_LEN],
    /// The signed portion (everything after the signature).
    pub message: &'a [u8],
    pub payer: &'a str,
    pub token: &'a str,
    pub compute_unit_limit: Option<u32>,
    pub payload: &'a [u8],
}

/// Build the message that gets signed.
pub(crate) fn encode_message(
    payer: &str,
    token: &str,
    compute_unit_limit: Option<u32>,
    payload: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let payer_len = u16::try_from(payer.len()).map_err(|_| EnvelopeError::FieldTooLong(payer.len()))?;
    let token_len = u16::try_from(token.len()).map_err(|_| EnvelopeError::FieldTooLong(token.len()))?;

    let mut message = Vec::with_capacity(8 + payer.len() + token.len() + payload.len());
    message.extend_from_slice(&payer_len.to_le_bytes());
    message.extend_from_slice(payer.as_bytes());
    message.extend_from_slice(&token_len.to_le_bytes());
    message.extend_from_slice(token.as_bytes());
    message.extend_from_slice(&compute_unit_limit.unwrap_or(0).to_le_bytes());
    message.extend_from_slice(payload);
    Ok(message)
}

/// Decode signed envelope bytes without verifying the signature.
pub fn open_envelope(bytes: &[u8]) -> Result<Envelope<'_>, EnvelopeError> {
    if bytes.len() < SIGNATURE_LEN {
        return Err(EnvelopeError::Truncated);
    }
    let (sig, message) = bytes.split_at(SIGNATURE_LEN);
    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(sig);

    let mut cursor = Cursor { buf: message };
    let payer = cursor.str_field()?;
    let token = cursor.str_field()?;
    let limit = u32::from_le_bytes(cursor.take_array::<4>()?);
    let payload = cursor.buf;

    Ok(Envelope {
        signature,
        message,
        payer,
        token,
        compute_unit_limit: (limit != 0).then_some(limit),
        payload,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EnvelopeError> {
        if self.buf.len() < n {
            return Err(EnvelopeError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], EnvelopeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn str_field(&mut self) -> Result<&'a str, EnvelopeError> {
        let len = u16::from_le_bytes(self.take_array::<2>()?) as usize;
        std::str::from_utf8(self.take(len)?).map_err(|_| EnvelopeError::InvalidUtf8)
    }
}
