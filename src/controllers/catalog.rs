use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::cache::catalog::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::models::{Movie, ShowDetails};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{movie_id}/shows", get(list_shows_for_movie))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<i64>,
}

impl PageQuery {
    /// `(limit, offset)` for the store.
    pub fn bounds(&self) -> Result<(i64, i64)> {
        self.validate().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let limit = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = (self.page.unwrap_or(1) - 1).saturating_mul(limit);
        Ok((limit, offset))
    }
}

// GET /api/movies
async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<Movie>>> {
    let (limit, offset) = params.bounds()?;
    Ok(Json(state.cache.movies(limit, offset).await?))
}

// GET /api/movies/{movie_id}/shows
async fn list_shows_for_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<ShowDetails>>> {
    let (limit, offset) = params.bounds()?;
    Ok(Json(state.cache.shows_for_movie(movie_id, limit, offset).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(PageQuery::default().bounds().unwrap(), (DEFAULT_PAGE_SIZE, 0));

        let third = PageQuery { page: Some(3), page_size: Some(10) };
        assert_eq!(third.bounds().unwrap(), (10, 20));

        let zero = PageQuery { page: Some(0), page_size: None };
        assert!(matches!(zero.bounds(), Err(Error::InvalidInput(_))));

        let huge = PageQuery { page: None, page_size: Some(1000) };
        assert!(matches!(huge.bounds(), Err(Error::InvalidInput(_))));
    }
}
