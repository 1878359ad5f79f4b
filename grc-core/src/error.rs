//! Error kinds and policies from the error handling design: most remote-data
//! problems are logged and tolerated rather than surfaced, so only the
//! registration-time and construction-time failures become a public `Error`.

use crate::provider::ProviderError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} is not a registrable config target: {}", type_name, reason))]
    InvalidTarget { type_name: String, reason: String },

    #[snafu(display("field '{}' has an unsupported type: {}", path, type_name))]
    UnsupportedFieldType { path: String, type_name: String },

    #[snafu(display("backend unavailable during {}: {}", during, source))]
    BackendUnavailable { during: String, source: ProviderError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
