//! Channel address composition.
//!
//! Every channel connects to its own resource path below the server's base
//! address: `http://host:3000/io?token=t` joined with `bids` becomes
//! `http://host:3000/io/bids?token=t`.

use thiserror::Error;
use url::Url;

/// Errors raised while composing channel addresses.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The configured base address is not a URL.
    #[error("invalid base address '{address}': {source}")]
    InvalidBase {
        /// Address as configured.
        address: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// The base address cannot carry a path (e.g. `mailto:`).
    #[error("base address '{address}' cannot carry a channel path")]
    CannotBeABase {
        /// Offending address.
        address: String,
    },
    /// Channel names must not be empty.
    #[error("channel name must not be empty")]
    EmptyChannel,
}

/// Builds the address of channel `name` below `base`.
///
/// Scheme, authority, and query of the base are kept; the fragment is dropped.
///
/// # Errors
///
/// Returns [`AddressError::EmptyChannel`] for a blank name and
/// [`AddressError::CannotBeABase`] when the base cannot hold a path.
pub fn channel_url(base: &Url, name: &str) -> Result<Url, AddressError> {
    let segment = name.trim();
    if segment.is_empty() {
        return Err(AddressError::EmptyChannel);
    }

    let mut url = base.clone();
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| AddressError::CannotBeABase {
            address: base.to_string(),
        })?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
