//! Persistent device identity
//!
//! The identity is a 4-character uppercase hexadecimal token kept in a 5-byte
//! storage slot: one signature byte followed by the 4 ASCII characters. It is
//! generated once and recovered verbatim on every later boot.

use crate::error::StorageError;
use crate::storage::PersistentStorage;
use rand::Rng;
use std::fmt;
use tracing::{info, warn};

/// Marks the storage slot as holding a valid identity
pub const SIGNATURE: u8 = 0xAA;
/// Signature byte plus the 4 identity bytes
pub const SLOT_SIZE: usize = 5;
/// Number of identity characters
pub const IDENTITY_LEN: usize = 4;

const SIGNATURE_OFFSET: usize = 0;
const IDENTITY_OFFSET: usize = 1;
/// Exclusive upper bound of generated identities
const IDENTITY_RANGE: u32 = 0xFFFF;

/// Unique per-unit device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Parse a strictly formatted identity (`[0-9A-F]{4}`)
    pub fn parse(value: &str) -> Option<Self> {
        is_valid_identity(value.as_bytes()).then(|| Self(value.to_string()))
    }

    /// Render a random value as a zero-padded uppercase hex identity
    pub fn from_value(value: u16) -> Self {
        Self(format!("{value:04X}"))
    }

    /// Accept stored bytes verbatim, replacing non-UTF-8 sequences
    fn from_stored_bytes(bytes: &[u8]) -> Self {
        Self(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_identity(bytes: &[u8]) -> bool {
    bytes.len() == IDENTITY_LEN
        && bytes
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
}

/// How a signed slot with malformed contents is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityOptions {
    /// Regenerate when the stored bytes are not `[0-9A-F]{4}`; otherwise the
    /// bytes are returned as they are
    pub repair_invalid: bool,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            repair_invalid: true,
        }
    }
}

/// Where a loaded identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Read back from a signed slot
    Recovered,
    /// Freshly generated and committed
    Generated,
    /// Generated because the signed slot was corrupt
    Repaired,
}

/// Recover the identity from storage, generating and committing a new one when
/// the slot is unsigned
pub fn load_or_create_identity<S, R>(
    storage: &mut S,
    rng: &mut R,
    options: IdentityOptions,
) -> Result<DeviceIdentity, StorageError>
where
    S: PersistentStorage,
    R: Rng,
{
    load_or_create_identity_with_source(storage, rng, options).map(|(identity, _)| identity)
}

/// Like [`load_or_create_identity`], also reporting how the identity was
/// obtained
pub fn load_or_create_identity_with_source<S, R>(
    storage: &mut S,
    rng: &mut R,
    options: IdentityOptions,
) -> Result<(DeviceIdentity, IdentitySource), StorageError>
where
    S: PersistentStorage,
    R: Rng,
{
    storage.begin(SLOT_SIZE)?;
    let result = read_or_generate(storage, rng, options);
    // The slot is released on both paths; a read error takes priority
    let end_result = storage.end();
    let loaded = result?;
    end_result?;
    Ok(loaded)
}

fn read_or_generate<S, R>(
    storage: &mut S,
    rng: &mut R,
    options: IdentityOptions,
) -> Result<(DeviceIdentity, IdentitySource), StorageError>
where
    S: PersistentStorage,
    R: Rng,
{
    if storage.read(SIGNATURE_OFFSET)? == SIGNATURE {
        let mut stored = [0u8; IDENTITY_LEN];
        for (i, byte) in stored.iter_mut().enumerate() {
            *byte = storage.read(IDENTITY_OFFSET + i)?;
        }

        if is_valid_identity(&stored) || !options.repair_invalid {
            let identity = DeviceIdentity::from_stored_bytes(&stored);
            info!(client_id = %identity, "Loaded client ID from storage");
            return Ok((identity, IdentitySource::Recovered));
        }

        warn!(
            stored = ?stored,
            "Stored client ID is not a 4-digit hex value, regenerating"
        );
        let identity = generate_and_store(storage, rng)?;
        return Ok((identity, IdentitySource::Repaired));
    }

    let identity = generate_and_store(storage, rng)?;
    Ok((identity, IdentitySource::Generated))
}

fn generate_and_store<S, R>(storage: &mut S, rng: &mut R) -> Result<DeviceIdentity, StorageError>
where
    S: PersistentStorage,
    R: Rng,
{
    let value = rng.gen_range(0..IDENTITY_RANGE) as u16;
    let identity = DeviceIdentity::from_value(value);

    storage.write(SIGNATURE_OFFSET, SIGNATURE)?;
    for (i, byte) in identity.as_str().bytes().enumerate() {
        storage.write(IDENTITY_OFFSET + i, byte)?;
    }
    storage.commit()?;

    info!(client_id = %identity, "Generated new client ID");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_blank_storage_generates_and_commits() {
        let mut storage = MemoryStorage::new();
        let mut rng = StdRng::seed_from_u64(7);

        let (identity, source) =
            load_or_create_identity_with_source(&mut storage, &mut rng, IdentityOptions::default())
                .unwrap();

        assert_eq!(source, IdentitySource::Generated);
        assert_eq!(storage.commit_count(), 1);
        assert_eq!(storage.image()[0], SIGNATURE);
        assert_eq!(&storage.image()[1..5], identity.as_str().as_bytes());
    }

    #[test]
    fn test_signed_slot_is_recovered_without_commit() {
        let mut storage = MemoryStorage::from_image(vec![SIGNATURE, b'6', b'8', b'4', b'0']);
        let mut rng = StdRng::seed_from_u64(1);

        let (identity, source) =
            load_or_create_identity_with_source(&mut storage, &mut rng, IdentityOptions::default())
                .unwrap();

        assert_eq!(identity.as_str(), "6840");
        assert_eq!(source, IdentitySource::Recovered);
        assert_eq!(storage.commit_count(), 0);
    }

    #[test]
    fn test_small_values_are_zero_padded() {
        assert_eq!(DeviceIdentity::from_value(0).as_str(), "0000");
        assert_eq!(DeviceIdentity::from_value(0xA).as_str(), "000A");
        assert_eq!(DeviceIdentity::from_value(0x1B2).as_str(), "01B2");
        assert_eq!(DeviceIdentity::from_value(0xFFFE).as_str(), "FFFE");
    }

    #[test]
    fn test_corrupt_slot_is_repaired_by_default() {
        let mut storage = MemoryStorage::from_image(vec![SIGNATURE, b's', b'/', b'#', 0x00]);
        let mut rng = StdRng::seed_from_u64(3);

        let (identity, source) =
            load_or_create_identity_with_source(&mut storage, &mut rng, IdentityOptions::default())
                .unwrap();

        assert_eq!(source, IdentitySource::Repaired);
        assert!(DeviceIdentity::parse(identity.as_str()).is_some());
        assert_eq!(&storage.image()[1..5], identity.as_str().as_bytes());
    }

    #[test]
    fn test_corrupt_slot_kept_when_lenient() {
        let mut storage = MemoryStorage::from_image(vec![SIGNATURE, b'a', b'b', b'c', b'd']);
        let mut rng = StdRng::seed_from_u64(3);
        let options = IdentityOptions {
            repair_invalid: false,
        };

        let (identity, source) =
            load_or_create_identity_with_source(&mut storage, &mut rng, options).unwrap();

        assert_eq!(identity.as_str(), "abcd");
        assert_eq!(source, IdentitySource::Recovered);
        assert_eq!(storage.commit_count(), 0);
    }

    #[test]
    fn test_parse_rejects_lowercase_and_length() {
        assert!(DeviceIdentity::parse("00AF").is_some());
        assert!(DeviceIdentity::parse("00af").is_none());
        assert!(DeviceIdentity::parse("ABC").is_none());
        assert!(DeviceIdentity::parse("ABCDE").is_none());
        assert!(DeviceIdentity::parse("G000").is_none());
    }

    proptest! {
        #[test]
        fn generated_identity_is_four_uppercase_hex_digits(seed in any::<u64>()) {
            let mut storage = MemoryStorage::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let identity =
                load_or_create_identity(&mut storage, &mut rng, IdentityOptions::default()).unwrap();
            prop_assert!(is_valid_identity(identity.as_str().as_bytes()), "bad identity {}", identity);
        }

        #[test]
        fn identity_survives_restart(seed in any::<u64>()) {
            let mut storage = MemoryStorage::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let first =
                load_or_create_identity(&mut storage, &mut rng, IdentityOptions::default()).unwrap();

            let mut rebooted = MemoryStorage::from_image(storage.image().to_vec());
            let second =
                load_or_create_identity(&mut rebooted, &mut rng, IdentityOptions::default()).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(rebooted.commit_count(), 0);
        }
    }
}
