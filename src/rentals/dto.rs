use serde::Deserialize;
use time::OffsetDateTime;

/// Body of POST /v1/cars/:id/rent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentCarRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub rent_started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub rent_ended_at: Option<OffsetDateTime>,
}
