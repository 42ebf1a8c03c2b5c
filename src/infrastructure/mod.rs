pub mod http;
pub mod stream;

use url::Url;

use crate::errors::SyncError;

// Url::join drops the last path segment of a base without a trailing
// slash, so normalize before joining.
pub(crate) fn join_base(base: &str, path: &str) -> Result<Url, SyncError> {
    let mut base = base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(path.trim_start_matches('/'))?)
}
