//! The stateless address-binding cookie used to validate an Induction→Conclusion round trip
//! without the listener keeping any per-peer state between the two messages.
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::time::Duration;

use ahash::AHasher;

/// Width of the time bucket a cookie is bound to. A Conclusion arriving in a different bucket
/// than the one its cookie was minted in is rejected as `BadCookie`.
const BUCKET: Duration = Duration::from_secs(60);

/// Derives the cookie for `addr` at time `now` (monotonic time since some fixed epoch).
///
/// Two calls with the same address and times in the same 60-second bucket always agree; calls
/// in different buckets disagree with overwhelming probability. `seed1`/`seed2` key the
/// underlying hash so a cookie cannot be reproduced without knowing the listener's seed.
pub fn calc_cookie(addr: SocketAddr, now: Duration, seed1: u64, seed2: u64) -> u32 {
    let bucket = now.as_secs() / BUCKET.as_secs();

    let mut hasher = AHasher::new_with_keys(seed1, seed2);
    addr.ip().hash(&mut hasher);
    addr.port().hash(&mut hasher);
    bucket.hash(&mut hasher);

    hasher.finish() as u32
}
