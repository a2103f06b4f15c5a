//! Wire protocol: envelopes, bundles and the JSON codec.
//!
//! Every frame exchanged between endpoints is one JSON object. Replies are
//! correlated through a positive `callback_id`; bundles carry several
//! sub-envelopes in a single frame to reduce per-frame overhead.

pub mod codec;
pub mod envelope;

pub use codec::{Codec, WireProfile};
pub use envelope::{
    AUTHENTICATE_TYPE, CALLBACK_TYPE, CallbackId, Envelope, Inbound, SubEnvelope,
};
