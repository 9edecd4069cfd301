//! Chronologically ordered insertion keys.
//!
//! A push key is 20 characters: 8 encoding the epoch-millis timestamp in a
//! lexicographic base-64 alphabet, followed by 12 characters of entropy.
//! Keys generated later sort later as plain strings, so a message log keyed
//! by push ids replays in commit order without consulting payload
//! timestamps. Keys generated in the same millisecond stay ordered by
//! incrementing the entropy suffix of the previous key.

use rand::Rng;

/// Alphabet chosen so that byte-wise string order matches generation order.
const ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 8;
const ENTROPY_CHARS: usize = 12;

/// Stateful generator; one per store instance.
#[derive(Debug)]
pub struct PushIdGenerator {
    last_millis: i64,
    last_entropy: [usize; ENTROPY_CHARS],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            last_millis: 0,
            last_entropy: [0; ENTROPY_CHARS],
        }
    }

    /// Generate the next key for the given timestamp.
    pub fn next_id(&mut self, now_millis: i64) -> String {
        if now_millis == self.last_millis {
            // Same millisecond: bump the previous entropy so ordering holds.
            for slot in self.last_entropy.iter_mut().rev() {
                if *slot < 63 {
                    *slot += 1;
                    break;
                }
                *slot = 0;
            }
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_entropy.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
            self.last_millis = now_millis;
        }

        let mut key = String::with_capacity(TIMESTAMP_CHARS + ENTROPY_CHARS);
        let mut ts = now_millis;
        let mut ts_chars = [0u8; TIMESTAMP_CHARS];
        for c in ts_chars.iter_mut().rev() {
            *c = ALPHABET[(ts % 64) as usize];
            ts /= 64;
        }
        key.extend(ts_chars.iter().map(|&b| b as char));
        key.extend(self.last_entropy.iter().map(|&i| ALPHABET[i] as char));
        key
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_have_fixed_length() {
        let mut gen = PushIdGenerator::new();
        assert_eq!(gen.next_id(1_700_000_000_000).len(), 20);
    }

    #[test]
    fn keys_sort_by_generation_order_across_millis() {
        let mut gen = PushIdGenerator::new();
        let a = gen.next_id(1_700_000_000_000);
        let b = gen.next_id(1_700_000_000_001);
        assert!(a < b);
    }

    #[test]
    fn keys_sort_by_generation_order_within_a_milli() {
        let mut gen = PushIdGenerator::new();
        let mut prev = gen.next_id(42);
        for _ in 0..100 {
            let next = gen.next_id(42);
            assert!(prev < next, "{prev} should sort before {next}");
            prev = next;
        }
    }
}
