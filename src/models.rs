//! Request and response types of the HTTP API

use crate::sanitize::Row;

use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    100
}

fn default_limit() -> u32 {
    10
}

/// Query string of an EAR data request
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
pub struct QueryParams {
    /// Dataset identifier on the open data portal
    #[validate(length(min = 1, message = "package_id must not be empty"))]
    pub package_id: String,
    /// Calendar year
    #[validate(range(min = 1, message = "ano must be a positive year"))]
    pub ano: Option<i32>,
    /// Month of `ano`
    #[validate(range(min = 1, max = 12, message = "mes must be between 1 and 12"))]
    pub mes: Option<u32>,
    /// Reservoir name substring, matched ignoring case
    pub nome_reservatorio: Option<String>,
    /// Start of an inclusive date range
    pub start_date: Option<String>,
    /// End of an inclusive date range
    pub end_date: Option<String>,
    /// Page number, starting at 1
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page must be greater than 0"))]
    pub page: usize,
    /// Number of rows per page
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, message = "page_size must be greater than 0"))]
    pub page_size: usize,
}

/// One page of EAR rows
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
    /// Whether rows remain after this page
    pub has_more: bool,
    pub data: Vec<Row>,
}

/// A row of the warehouse table
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DataItem {
    pub id: i64,
    pub nome: String,
    pub valor: f64,
}

/// Request body of a warehouse insert
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DataCreate {
    #[validate(length(min = 1, message = "nome must not be empty"))]
    pub nome: String,
    pub valor: f64,
}

/// Query string of a warehouse read
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
pub struct WarehouseQuery {
    /// Maximum number of rows
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, message = "limit must be greater than 0"))]
    pub limit: u32,
}

/// Plain acknowledgement
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::query_params;

    use axum::extract::{rejection::QueryRejection, Query};
    use axum::http::Uri;
    use serde::de::DeserializeOwned;

    fn parse<T: DeserializeOwned>(query: &str) -> Result<T, QueryRejection> {
        let uri: Uri = format!("http://localhost/?{}", query).parse().unwrap();
        Query::<T>::try_from_uri(&uri).map(|Query(value)| value)
    }

    fn from_query(query: &str) -> Result<QueryParams, QueryRejection> {
        parse(query)
    }

    #[test]
    fn query_defaults() {
        let params = from_query("package_id=ear-diario-por-reservatorio").unwrap();
        assert_eq!(query_params("ear-diario-por-reservatorio"), params);
        assert_eq!(1, params.page);
        assert_eq!(100, params.page_size);
        params.validate().unwrap();
    }

    #[test]
    fn query_all_fields() {
        let params = from_query(
            "package_id=ear&ano=2021&mes=7&nome_reservatorio=FURNAS\
             &start_date=2020-06-01&end_date=31%2F01%2F2021&page=2&page_size=50",
        )
        .unwrap();
        assert_eq!(Some(2021), params.ano);
        assert_eq!(Some(7), params.mes);
        assert_eq!(Some("FURNAS".to_string()), params.nome_reservatorio);
        assert_eq!(Some("31/01/2021".to_string()), params.end_date);
        assert_eq!(2, params.page);
        assert_eq!(50, params.page_size);
        params.validate().unwrap();
    }

    #[test]
    fn query_missing_package_id() {
        assert!(from_query("ano=2021").is_err());
    }

    #[test]
    fn query_invalid_type() {
        assert!(from_query("package_id=ear&ano=last").is_err());
    }

    #[test]
    fn query_empty_package_id() {
        let params = from_query("package_id=").unwrap();
        let errors = params.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("package_id"));
    }

    #[test]
    fn query_page_zero() {
        let mut params = query_params("ear");
        params.page = 0;
        params.page_size = 0;
        let errors = params.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("page"));
        assert!(errors.field_errors().contains_key("page_size"));
    }

    #[test]
    fn query_month_out_of_range() {
        let mut params = query_params("ear");
        params.mes = Some(13);
        let errors = params.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("mes"));
        params.mes = Some(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn query_year_not_positive() {
        let mut params = query_params("ear");
        params.ano = Some(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn data_create() {
        let data: DataCreate = serde_json::from_str(r#"{"nome": "FURNAS", "valor": 55.5}"#).unwrap();
        assert_eq!(
            DataCreate {
                nome: "FURNAS".to_string(),
                valor: 55.5
            },
            data
        );
        data.validate().unwrap();
    }

    #[test]
    fn data_create_unknown_field() {
        let result = serde_json::from_str::<DataCreate>(r#"{"nome": "A", "valor": 1, "id": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn data_create_empty_name() {
        let data: DataCreate = serde_json::from_str(r#"{"nome": "", "valor": 1}"#).unwrap();
        assert!(data.validate().is_err());
    }

    #[test]
    fn warehouse_query_default_limit() {
        let query: WarehouseQuery = parse("").unwrap();
        assert_eq!(10, query.limit);
        let query: WarehouseQuery = parse("limit=0").unwrap();
        assert!(query.validate().is_err());
    }

    #[test]
    fn page_serialization() {
        let mut row = Row::new();
        row.insert("nom_reservatorio".to_string(), "FURNAS".into());
        let page = Page {
            page: 1,
            page_size: 1,
            has_more: true,
            data: vec![row],
        };
        assert_eq!(
            r#"{"page":1,"page_size":1,"has_more":true,"data":[{"nom_reservatorio":"FURNAS"}]}"#,
            serde_json::to_string(&page).unwrap()
        );
    }
}
