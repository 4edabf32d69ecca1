use sha1::{Digest, Sha1};

/// SHA-1 digest, used for both piece hashes and the info hash
pub fn digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Check assembled piece bytes against their expected digest.
///
/// Every byte of the digest is compared; the loop does not exit early.
pub fn verify(data: &[u8], expected: &[u8; 20]) -> bool {
    digest(data)
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hex::encode(digest(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_verify() {
        let data = vec![7u8; 1000];
        let expected = digest(&data);
        assert!(verify(&data, &expected));

        let mut corrupted = data.clone();
        corrupted[999] ^= 1;
        assert!(!verify(&corrupted, &expected));
        assert!(!verify(&data[..999], &expected));
    }
}
