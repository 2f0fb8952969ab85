use rand::RngCore;
use uuid::Uuid;

/// Generate a deterministic v4-format UUID from a seeded RNG.
pub fn generate_uuid<R: RngCore + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
