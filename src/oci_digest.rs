use digest::{Digest, DynDigest};
use sha2::{Sha256, Sha512};

use crate::{Error, Result};

/// An OCI content digest: `<algorithm>:<hex-encoded digest>`.
///
/// https://github.com/opencontainers/image-spec/blob/main/descriptor.md#digests
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OciDigest {
    algorithm: RegisteredAlgorithm,
    encoded: String,
}

impl TryFrom<&str> for OciDigest {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        let i = match s.find(':') {
            Some(i) => i,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algo: &str = match s.get(..i) {
            Some(a) => a,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let encoded: &str = match s.get(i + 1..) {
            Some(e) if !e.is_empty() => e,
            Some(_) => return Err(Error::InvalidDigest(s.to_string())),
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        if !encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        let algorithm = match algo {
            "sha256" => RegisteredAlgorithm::Sha256,
            "sha512" => RegisteredAlgorithm::Sha512,
            _ => return Err(Error::InvalidDigest(s.to_string())),
        };

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl TryFrom<String> for OciDigest {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        s.as_str().try_into()
    }
}

/// Computes the sha256 digest of `bs`, the algorithm used whenever the
/// registry itself mints a digest (manifest bodies, assembled blobs).
impl From<&[u8]> for OciDigest {
    fn from(bs: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        Digest::update(&mut hasher, bs);
        let s = hasher.finalize();

        Self {
            algorithm: RegisteredAlgorithm::Sha256,
            encoded: format!("{:x}", s),
        }
    }
}

impl From<OciDigest> for String {
    fn from(d: OciDigest) -> String {
        format!("{}:{}", String::from(&d.algorithm), d.encoded)
    }
}

impl From<&OciDigest> for String {
    fn from(d: &OciDigest) -> String {
        format!("{}:{}", String::from(&d.algorithm), d.encoded)
    }
}

impl std::fmt::Display for OciDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", String::from(&self.algorithm), self.encoded)
    }
}

impl OciDigest {
    /// The hex-encoded portion, without the `algorithm:` prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// A fresh running hasher for this digest's algorithm, used to verify
    /// assembled upload content against a declared digest at finalize time.
    pub fn digester(&self) -> Digester {
        Digester {
            inner: match self.algorithm {
                RegisteredAlgorithm::Sha256 => Box::new(Sha256::new()),
                RegisteredAlgorithm::Sha512 => Box::new(Sha512::new()),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum RegisteredAlgorithm {
    Sha256,
    Sha512,
}

impl From<&RegisteredAlgorithm> for String {
    fn from(a: &RegisteredAlgorithm) -> String {
        match a {
            RegisteredAlgorithm::Sha256 => String::from("sha256"),
            RegisteredAlgorithm::Sha512 => String::from("sha512"),
        }
    }
}

/// A boxed, algorithm-erased running digest.
pub struct Digester {
    inner: Box<dyn DynDigest + Send + Sync>,
}

impl Digester {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::sha256("sha256:0011deadbeef", Ok(OciDigest {
        algorithm: RegisteredAlgorithm::Sha256,
        encoded: String::from("0011deadbeef"),
    }))]
    #[case::sha512("sha512:0011deadbeef", Ok(OciDigest {
        algorithm: RegisteredAlgorithm::Sha512,
        encoded: String::from("0011deadbeef"),
    }))]
    #[case::unknown_algorithm("sha666:meow", Err(Error::InvalidDigest(String::from("sha666:meow"))))]
    #[case::non_hex_encoding("sha256:not-hex!", Err(Error::InvalidDigest(String::from("sha256:not-hex!"))))]
    #[case::missing_colon("sha256meow", Err(Error::InvalidDigest(String::from("sha256meow"))))]
    #[case::empty_encoded("sha256:", Err(Error::InvalidDigest(String::from("sha256:"))))]
    #[case::empty_algorithm(":meow", Err(Error::InvalidDigest(String::from(":meow"))))]
    fn validate_try_from(#[case] input: &str, #[case] expected: Result<OciDigest>) {
        let actual: Result<OciDigest> = input.try_into();
        match (expected, actual) {
            (Ok(exp), Ok(act)) => assert_eq!(exp, act),
            (Ok(s), Err(e)) => panic!("expected Ok( {s:?} ) got Err( {e:?} )"),
            (Err(exp), Err(act)) => assert_eq!(format!("{exp}"), format!("{act}")),
            (Err(e), Ok(s)) => panic!("expected Err( {e:?} ) got Ok( {s:?} )"),
        }
    }

    #[test]
    fn digest_of_bytes_matches_known_vector() {
        // sha256("") per FIPS 180-4 test vectors
        let d: OciDigest = b"".as_ref().into();
        assert_eq!(
            String::from(&d),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
    }
}
