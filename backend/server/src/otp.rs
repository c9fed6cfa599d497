//! One-time passcodes.
//!
//! Codes are 6 decimal digits drawn from the OS random source and kept as strings so
//! leading zeroes survive. Only the SHA-256 digest of a code is ever stored.
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{Rng, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const OTP_DIGITS: usize = 6;
const OTP_SPACE: u32 = 1_000_000;

pub trait OtpSource: Send + Sync {
    fn generate(&self) -> String;
}

pub struct RandomOtp;

impl OtpSource for RandomOtp {
    fn generate(&self) -> String {
        let code = OsRng.gen_range(0..OTP_SPACE);
        format!("{code:0width$}", width = OTP_DIGITS)
    }
}

/// Hands out a fixed list of codes in order, wrapping around at the end.
pub struct ScriptedOtp {
    codes: Vec<String>,
    next: AtomicUsize,
}

impl ScriptedOtp {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl OtpSource for ScriptedOtp {
    fn generate(&self) -> String {
        if self.codes.is_empty() {
            return "0".repeat(OTP_DIGITS);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.codes.len();
        self.codes[index].clone()
    }
}

pub fn hash_otp(otp: &str) -> String {
    hex::encode(Sha256::digest(otp.as_bytes()))
}

pub fn otp_matches(otp: &str, expected_hash: &str) -> bool {
    hash_otp(otp)
        .as_bytes()
        .ct_eq(expected_hash.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_format() {
        let source = RandomOtp;

        for _ in 0..1_000 {
            let code = source.generate();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_scripted_wraps() {
        let source = ScriptedOtp::new(["000042", "123456"]);

        assert_eq!(source.generate(), "000042");
        assert_eq!(source.generate(), "123456");
        assert_eq!(source.generate(), "000042");
        assert_eq!(ScriptedOtp::new(Vec::<String>::new()).generate(), "000000");
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_otp("123456"),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[test]
    fn test_matches() {
        let stored = hash_otp("007007");

        assert!(otp_matches("007007", &stored));
        assert!(!otp_matches("7007", &stored));
        assert!(!otp_matches("007008", &stored));
        assert!(!otp_matches("007007", ""));
    }
}
