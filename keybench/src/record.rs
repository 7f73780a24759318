//! The record type written to and read from backends.

use std::time::{SystemTime, UNIX_EPOCH};

use keybench_core::RecordSource;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// A semi-realistic record, chosen to cover a wide range of field types.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Primary key, assigned from an ID generator on insert.
    pub id: u64,
    /// Random name.
    pub name: String,
    /// Up to four nested address documents.
    pub addresses: Vec<Address>,
    /// Random phone number.
    pub phone_number: String,
    /// Date of birth in seconds since the unix epoch.
    pub dob: u64,
    /// Age, queried by range reads.
    pub age: u32,
    /// Balance, changed by updates.
    pub balance: f64,
    /// Random flag.
    pub enabled: bool,
    /// Random counter.
    pub counter: i32,
    /// Binary padding to control the record size.
    #[serde(with = "padding")]
    pub padding: Vec<u8>,
}

/// A nested document within [`Person`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Address {
    pub number: u8,
    pub line1: String,
    pub line2: String,
}

impl Person {
    /// Creates a record with `padding` bytes of binary padding, without randomising it.
    pub fn with_padding(padding: usize) -> Self {
        Self {
            padding: vec![0; padding],
            ..Default::default()
        }
    }

    /// Overwrites all fields except the ID with random data.
    ///
    /// The length of the padding stays the same.
    pub fn randomise(&mut self, rng: &mut SmallRng) {
        rng.fill_bytes(&mut self.padding);
        self.name = random_string(rng, 50);

        let n: u64 = rng.random();
        let address_count = rng.random_range(0..5);
        self.addresses = (0..address_count)
            .map(|_| Address {
                number: n as u8,
                line1: random_string(rng, 30),
                line2: random_string(rng, 30),
            })
            .collect();

        self.phone_number = random_string(rng, 30);
        self.dob = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs())
            .unwrap_or_default();
        self.age = n as u32;
        self.balance = rng.sample(StandardNormal);
        self.enabled = rng.random();
        self.counter = n as i32;
    }
}

/// Returns a random alphanumeric string shorter than `max_len`.
fn random_string(rng: &mut SmallRng, max_len: usize) -> String {
    let len = rng.random_range(0..max_len);
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Creates one randomised [`Person`] per worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct PersonSource {
    /// Bytes of binary padding in each record.
    pub padding: usize,
}

impl RecordSource for PersonSource {
    type Record = Person;

    fn create(&self, rng: &mut SmallRng) -> Person {
        let mut person = Person::with_padding(self.padding);
        person.randomise(rng);
        person
    }
}

/// Serializes padding as a base64 string rather than an array of numbers.
mod padding {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn randomise_keeps_id_and_padding_length() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut person = Person::with_padding(64);
        person.id = 42;

        person.randomise(&mut rng);

        assert_eq!(person.id, 42);
        assert_eq!(person.padding.len(), 64);
        assert!(person.name.len() < 50);
        assert!(person.addresses.len() < 5);
        assert!(person.padding.iter().any(|&b| b != 0));
    }

    #[test]
    fn json_encoding() {
        let mut rng = SmallRng::seed_from_u64(2);
        let person = PersonSource { padding: 16 }.create(&mut rng);

        let json = serde_json::to_vec(&person).unwrap();
        let decoded: Person = serde_json::from_slice(&json).unwrap();

        assert_eq!(decoded.name, person.name);
        assert_eq!(decoded.addresses, person.addresses);
        assert_eq!(decoded.padding, person.padding);
        assert!((decoded.balance - person.balance).abs() < 1e-9);
    }

    #[test]
    fn padding_is_base64() {
        let person = Person {
            padding: vec![0xde, 0xad, 0xbe, 0xef],
            ..Default::default()
        };

        let json = serde_json::to_value(&person).unwrap();
        assert_eq!(json["padding"], "3q2+7w==");
    }

    #[test]
    fn malformed_padding_is_rejected() {
        let mut json = serde_json::to_value(Person::default()).unwrap();

        for padding in ["a\u{e9}1", "not base64!", "3q2+7w="] {
            json["padding"] = padding.into();
            let result = serde_json::from_value::<Person>(json.clone());
            assert!(result.is_err(), "{padding:?} decoded");
        }
    }
}
