//! Synthetic patient identities.

use async_trait::async_trait;
use rand::{Rng, seq::SliceRandom};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const LAB_CITIES: [&str; 10] = [
    "Auckland",
    "Wellington",
    "Christchurch",
    "Hamilton",
    "Tauranga",
    "Napier-Hastings",
    "Dunedin",
    "Palmerston North",
    "Nelson",
    "Rotorua",
];

/// Identity returned by the random-person API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomPerson {
    /// First and last name.
    pub full_name: String,
    /// Postal address ending in "New Zealand".
    pub address: String,
    /// Sex as reported by the API (`male`/`female`).
    pub sex: String,
    /// Age in years.
    pub age: u32,
    /// Date of birth, `YYYY-MM-DD`.
    pub dob: String,
}

impl RandomPerson {
    /// Identity substituted when the API is unavailable.
    pub fn fallback() -> Self {
        Self {
            full_name: "John Doe".into(),
            address: "123 Fake Street, Faketown, 0000, FakeState, New Zealand".into(),
            sex: "male".into(),
            age: 30,
            dob: "1981-01-01".into(),
        }
    }
}

/// Complete patient record printed on a blood report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patient {
    /// Identity details.
    pub person: RandomPerson,
    /// National Health Index identifier.
    pub nhi: String,
    /// City of the testing lab.
    pub lab: String,
}

impl Patient {
    /// Attach a random NHI and lab location to `person`.
    pub fn from_person<R: Rng + ?Sized>(person: RandomPerson, rng: &mut R) -> Self {
        Self {
            person,
            nhi: generate_nhi(rng),
            lab: lab_location(rng).to_string(),
        }
    }
}

/// Random 7-character NHI drawn from `[A-Z0-9]`.
pub fn generate_nhi<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_identifier(rng, 7)
}

/// Random 10-character lab number drawn from `[A-Z0-9]`.
pub fn generate_lab_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_identifier(rng, 10)
}

/// One of the ten lab cities.
pub fn lab_location<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    LAB_CITIES.choose(rng).copied().unwrap_or(LAB_CITIES[0])
}

fn random_identifier<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// Errors raised while fetching an identity.
#[derive(Debug, Error)]
pub enum PersonError {
    /// HTTP layer failed or the body could not be decoded.
    #[error("Random user request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("Random user API returned {0}")]
    Status(reqwest::StatusCode),
    /// The response carried no identity.
    #[error("Random user API returned no results")]
    Empty,
}

/// Source of synthetic identities.
#[async_trait]
pub trait PersonSource: Send + Sync {
    /// Produce one identity; implementations never fail and fall back instead.
    async fn person(&self) -> RandomPerson;
}

/// Client for the random-person API.
pub struct RandomUserClient {
    http: Client,
    url: String,
}

impl RandomUserClient {
    /// Build a client for `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, PersonError> {
        let http = Client::builder().user_agent("insightmed/0.1").build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Fetch one identity, surfacing errors instead of falling back.
    pub async fn fetch(&self) -> Result<RandomPerson, PersonError> {
        let response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(PersonError::Status(response.status()));
        }
        let body: RandomUserResponse = response.json().await?;
        body.results
            .into_iter()
            .next()
            .map(RandomUser::into_person)
            .ok_or(PersonError::Empty)
    }
}

#[async_trait]
impl PersonSource for RandomUserClient {
    async fn person(&self) -> RandomPerson {
        match self.fetch().await {
            Ok(person) => {
                tracing::debug!(name = %person.full_name, "Random user data fetched");
                person
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to fetch random user data, using default");
                RandomPerson::fallback()
            }
        }
    }
}

#[derive(Deserialize)]
struct RandomUserResponse {
    #[serde(default)]
    results: Vec<RandomUser>,
}

#[derive(Deserialize)]
struct RandomUser {
    gender: String,
    name: RandomUserName,
    location: RandomUserLocation,
    dob: RandomUserDob,
}

#[derive(Deserialize)]
struct RandomUserName {
    first: String,
    last: String,
}

#[derive(Deserialize)]
struct RandomUserLocation {
    street: RandomUserStreet,
    city: String,
    state: String,
    postcode: Value,
}

#[derive(Deserialize)]
struct RandomUserStreet {
    number: Value,
    name: String,
}

#[derive(Deserialize)]
struct RandomUserDob {
    date: String,
    age: u32,
}

impl RandomUser {
    fn into_person(self) -> RandomPerson {
        let location = self.location;
        let address = format!(
            "{} {}, {}, {}, {}, New Zealand",
            plain_text(&location.street.number),
            location.street.name,
            location.city,
            plain_text(&location.postcode),
            location.state
        );
        let dob = self
            .dob
            .date
            .split('T')
            .next()
            .unwrap_or_default()
            .to_string();
        RandomPerson {
            full_name: format!("{} {}", self.name.first, self.name.last),
            address,
            sex: self.gender,
            age: self.dob.age,
            dob,
        }
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    #[test]
    fn identifiers_use_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        let nhi = generate_nhi(&mut rng);
        let lab_number = generate_lab_number(&mut rng);

        assert_eq!(nhi.len(), 7);
        assert_eq!(lab_number.len(), 10);
        assert!(
            nhi.chars()
                .chain(lab_number.chars())
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        assert!(LAB_CITIES.contains(&lab_location(&mut rng)));
    }

    #[tokio::test]
    async fn parses_random_user_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/");
                then.status(200).json_body(json!({
                    "results": [{
                        "gender": "female",
                        "name": { "title": "Ms", "first": "Aria", "last": "Ngata" },
                        "location": {
                            "street": { "number": 4821, "name": "Kohimarama Road" },
                            "city": "Whanganui",
                            "state": "Manawatu-Wanganui",
                            "postcode": 63490
                        },
                        "dob": { "date": "1972-03-14T08:12:44.123Z", "age": 52 }
                    }]
                }));
            })
            .await;

        let client = RandomUserClient::new(server.url("/api/")).expect("client");
        let person = client.person().await;

        assert_eq!(person.full_name, "Aria Ngata");
        assert_eq!(
            person.address,
            "4821 Kohimarama Road, Whanganui, 63490, Manawatu-Wanganui, New Zealand"
        );
        assert_eq!(person.sex, "female");
        assert_eq!(person.age, 52);
        assert_eq!(person.dob, "1972-03-14");
    }

    #[tokio::test]
    async fn non_success_status_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/");
                then.status(503);
            })
            .await;

        let client = RandomUserClient::new(server.url("/api/")).expect("client");
        assert!(matches!(client.fetch().await, Err(PersonError::Status(_))));
        assert_eq!(client.person().await, RandomPerson::fallback());
    }
}
