use hmac::{Hmac, Mac};
use rand::Rng;
use rhai::{Blob, INT, ImmutableString, Module};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::sandbox::RhaiResultOf;

/// Upper bound for `random_bytes`.
const MAX_RANDOM_BYTES: usize = 1024 * 1024;

fn hmac_sha256(key: &[u8], message: &[u8]) -> RhaiResultOf<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| e.to_string())?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hex digests, HMAC, random bytes and v4 UUIDs.
pub(super) fn module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("sha256", |data: ImmutableString| -> RhaiResultOf<String> {
        Ok(hex::encode(Sha256::digest(data.as_bytes())))
    });
    module.set_native_fn("sha256", |data: Blob| -> RhaiResultOf<String> {
        Ok(hex::encode(Sha256::digest(&data)))
    });
    module.set_native_fn("keccak256", |data: ImmutableString| -> RhaiResultOf<String> {
        Ok(hex::encode(Keccak256::digest(data.as_bytes())))
    });
    module.set_native_fn("keccak256", |data: Blob| -> RhaiResultOf<String> {
        Ok(hex::encode(Keccak256::digest(&data)))
    });
    module.set_native_fn(
        "hmac_sha256",
        |key: ImmutableString, message: ImmutableString| {
            hmac_sha256(key.as_bytes(), message.as_bytes())
        },
    );
    module.set_native_fn("random_bytes", |n: INT| -> RhaiResultOf<Blob> {
        let n = usize::try_from(n)
            .ok()
            .filter(|n| *n <= MAX_RANDOM_BYTES)
            .ok_or_else(|| format!("random_bytes: length must be 0..={MAX_RANDOM_BYTES}"))?;
        let mut buf = vec![0u8; n];
        rand::thread_rng().fill(&mut buf[..]);
        Ok(buf)
    });
    module.set_native_fn("uuid", || -> RhaiResultOf<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    });

    module
}
