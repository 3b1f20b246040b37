//! AWS SES inbound mail via SNS.
//!
//! SES stores each received message in S3 and publishes a notification to an
//! SNS topic, which POSTs it to `/ses`:
//!
//! ```text
//! SNS envelope → verify → topic check → {confirm | relay from S3 | ack}
//! ```

pub mod dispatcher;
pub mod notification;
pub mod object_store;

pub use dispatcher::{NotificationDispatcher, Outcome, MAX_EMAIL_SIZE};
pub use notification::{EmailNotification, ReceiptAction};
pub use object_store::{ObjectStore, S3ObjectStore};
