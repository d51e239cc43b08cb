//! Reconciliation stories
//!
//! # Test Organization
//!
//! - `cluster_lifecycle`: first install and rolling updates through the
//!   cluster state machine
//!
//! - `dry_run`: a status pass never writes and always predicts what the
//!   following sync pass does
//!
//! - `spyt_release`: publishing a SPYT release into a running cluster

mod cluster_lifecycle;
mod dry_run;
mod helpers;
mod spyt_release;
