//! Kidsguide Client SDK.
//!
//! Client library for the kidsguide tariff and session service. Frontends
//! use it to open sessions and read venue tariffs; schedulers use it to
//! trigger the periodic jobs.
//!
//! # Example
//!
//! ```no_run
//! use kidsguide_client::{ClientOptions, KidsguideClient};
//! use kidsguide_core::{UserId, VenueId};
//!
//! # async fn example() -> Result<(), kidsguide_client::ClientError> {
//! let client = KidsguideClient::with_options(
//!     "http://kidsguide.venues.svc:8080",
//!     ClientOptions {
//!         service_api_key: Some("your-service-api-key".to_string()),
//!         ..ClientOptions::default()
//!     },
//! )?;
//!
//! let session = client.open_session(UserId::generate()).await?;
//! let tariff = client
//!     .get_tariff(&session.access_token, VenueId::generate())
//!     .await?;
//!
//! println!("{} ({:?})", tariff.tier, tariff.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, KidsguideClient};
pub use error::ClientError;
pub use types::*;
