use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::database::{Movie, MovieFilters};
use crate::error::ApiError;
use crate::AppState;

fn default_sort_by() -> String {
    "popularity".to_string()
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListMoviesParams {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub director: Option<String>,
    pub actor: Option<String>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Serialize)]
pub struct MovieListResponse {
    pub count: usize,
    pub movies: Vec<Movie>,
}

#[derive(Serialize)]
pub struct GenreListResponse {
    pub genres: Vec<String>,
}

/// Search and filter movies with optional parameters.
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<ListMoviesParams>,
) -> Result<Json<MovieListResponse>, ApiError> {
    let filters = MovieFilters {
        title: params.title,
        genre: params.genre,
        year: params.year,
        director: params.director,
        actor: params.actor,
        sort_by: params.sort_by,
        limit: params.limit.clamp(1, 100),
        offset: params.offset,
        ..Default::default()
    };

    let movies = state.db.search_movies(filters).await?;
    Ok(Json(MovieListResponse {
        count: movies.len(),
        movies,
    }))
}

/// Get full details for a single movie by its TMDB id.
pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> Result<Json<Movie>, ApiError> {
    match state.db.get_movie_detail(movie_id).await? {
        Some(movie) => Ok(Json(movie)),
        None => Err(ApiError::NotFound(format!("Movie {movie_id} not found"))),
    }
}

pub async fn list_genres(
    State(state): State<AppState>,
) -> Result<Json<GenreListResponse>, ApiError> {
    let genres = state.db.get_genres().await?;
    Ok(Json(GenreListResponse { genres }))
}
