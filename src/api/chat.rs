use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::database::{Database, Movie, MovieFilters};
use crate::error::ApiError;
use crate::query_parser::{Intent, ParsedQuery};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub intent: Intent,
    pub params: ParsedQuery,
    pub movies: Vec<Movie>,
}

/// Send a natural-language movie question.
///
/// The system parses the intent, queries the database, and uses an LLM
/// to generate a conversational response grounded in the retrieved data.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let length = request.message.chars().count();
    if length == 0 || length > 1000 {
        return Err(ApiError::Validation(
            "message must be between 1 and 1000 characters".to_string(),
        ));
    }

    let parsed = state.parser.parse(&request.message);
    tracing::info!(
        intent = parsed.intent.as_str(),
        titles = ?parsed.titles,
        genre = ?parsed.genre,
        "parsed chat message"
    );

    let movies = retrieve_movies(&parsed, &state.db).await?;
    let llm_response = state.llm.generate(&request.message, &movies).await;

    Ok(Json(ChatResponse {
        message: llm_response,
        intent: parsed.intent,
        params: parsed,
        movies,
    }))
}

/// Execute the right DB query based on parsed intent.
pub async fn retrieve_movies(parsed: &ParsedQuery, db: &Database) -> anyhow::Result<Vec<Movie>> {
    match parsed.intent {
        Intent::Lookup => {
            let mut results = Vec::new();
            for title in &parsed.titles {
                results.extend(
                    db.search_movies(MovieFilters {
                        title: Some(title.clone()),
                        limit: 3,
                        ..Default::default()
                    })
                    .await?,
                );
            }
            if results.is_empty() {
                if let Some(first) = parsed.titles.first() {
                    results.extend(
                        db.search_movies(MovieFilters {
                            title: Some(first.clone()),
                            limit: 5,
                            ..Default::default()
                        })
                        .await?,
                    );
                }
            }
            let mut detailed = Vec::new();
            for movie in results.iter().take(5) {
                if let Some(detail) = db.get_movie_detail(movie.id).await? {
                    detailed.push(detail);
                }
            }
            Ok(detailed)
        }

        Intent::Recommend => {
            db.search_movies(MovieFilters {
                genre: parsed.genre.clone(),
                year: parsed.year,
                year_from: parsed.year_from,
                year_to: parsed.year_to,
                sort_by: "rating".to_string(),
                limit: parsed.limit,
                ..Default::default()
            })
            .await
        }

        Intent::Compare => {
            let mut results = Vec::new();
            for title in parsed.titles.iter().take(5) {
                let found = db
                    .search_movies(MovieFilters {
                        title: Some(title.clone()),
                        limit: 1,
                        ..Default::default()
                    })
                    .await?;
                if let Some(movie) = found.first() {
                    if let Some(detail) = db.get_movie_detail(movie.id).await? {
                        results.push(detail);
                    }
                }
            }
            Ok(results)
        }

        Intent::TopRated => {
            db.get_top_rated(parsed.genre.clone(), parsed.year, parsed.limit)
                .await
        }

        Intent::CastCrew => {
            if let Some(person) = &parsed.person {
                return db.get_movies_by_person(person, parsed.limit).await;
            }
            let mut results = Vec::new();
            for title in &parsed.titles {
                let found = db
                    .search_movies(MovieFilters {
                        title: Some(title.clone()),
                        limit: 1,
                        ..Default::default()
                    })
                    .await?;
                if let Some(movie) = found.first() {
                    if let Some(detail) = db.get_movie_detail(movie.id).await? {
                        results.push(detail);
                    }
                }
            }
            Ok(results)
        }

        // Broad search with whatever params we extracted
        Intent::General => {
            db.search_movies(MovieFilters {
                title: parsed.titles.first().cloned(),
                genre: parsed.genre.clone(),
                year: parsed.year,
                sort_by: "popularity".to_string(),
                limit: parsed.limit,
                ..Default::default()
            })
            .await
        }
    }
}
