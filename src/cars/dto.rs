use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    cars::repo_types::{Car, CarFilter, NewCar},
    error::ApiError,
    pagination::{PageQuery, Pagination},
};

pub const CAR_SIZES: [&str; 3] = ["Small", "Medium", "Large"];

/// Clients send the price either as a number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Int(i64),
    Text(String),
}

/// Body of POST and PUT /v1/cars.
#[derive(Debug, Deserialize)]
pub struct CarRequest {
    pub name: String,
    pub price: PriceInput,
    pub size: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl TryFrom<CarRequest> for NewCar {
    type Error = ApiError;

    fn try_from(req: CarRequest) -> Result<Self, Self::Error> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        let price = match req.price {
            PriceInput::Int(p) => p,
            PriceInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::Validation(format!("price {s:?} is not a number")))?,
        };
        if price < 0 {
            return Err(ApiError::Validation("price must not be negative".into()));
        }
        if !CAR_SIZES.contains(&req.size.as_str()) {
            return Err(ApiError::Validation(format!(
                "size must be one of {}",
                CAR_SIZES.join(", ")
            )));
        }
        Ok(NewCar {
            name,
            price,
            size: req.size,
            image: req.image.filter(|i| !i.trim().is_empty()),
        })
    }
}

/// Query of GET /v1/cars.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCarsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub size: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub available_at: Option<OffsetDateTime>,
}

impl ListCarsQuery {
    pub fn page(&self) -> PageQuery {
        let defaults = PageQuery::default();
        PageQuery {
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
        .normalized()
    }

    pub fn filter(&self) -> CarFilter {
        CarFilter {
            size: self.size.clone(),
            available_at: self.available_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CarListResponse {
    pub cars: Vec<Car>,
    pub meta: ListMeta,
}
