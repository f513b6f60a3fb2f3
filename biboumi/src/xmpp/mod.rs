//! The XMPP component side of the gateway (spec.md §4.6).

pub mod disco;
pub mod session;

pub use session::{Inbound, XmppSession};
