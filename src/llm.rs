use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::database::Movie;
use crate::query_parser::LLM_CLASSIFY_PROMPT;

const SYSTEM_PROMPT: &str = "You are a knowledgeable and friendly movie expert assistant. \
Answer the user's question using ONLY the movie data provided below. \
Be conversational but concise, aim for 2-4 sentences unless the user \
asks for detail. If the data doesn't contain enough information, say so \
honestly. Never invent facts not present in the data.";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
pub struct OllamaStatus {
    pub ollama_reachable: bool,
    pub model_loaded: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for the local Ollama HTTP API. Generation failures never bubble
/// up as errors: the caller always gets prose, degraded to an apology that
/// points at the raw movie data when the model is unavailable.
pub struct OllamaService {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaService {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Check if Ollama is reachable and the configured model is available.
    pub async fn health_check(&self) -> OllamaStatus {
        let result = async {
            let response = self
                .client
                .get(format!("{}/api/tags", self.base_url))
                .timeout(HEALTH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            let body: serde_json::Value = response.json().await?;
            Ok::<_, anyhow::Error>(body)
        }
        .await;

        match result {
            Ok(body) => {
                let models: Vec<String> = body
                    .get("models")
                    .and_then(|v| v.as_array())
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                            .map(|n| n.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                let model_loaded = models.iter().any(|m| m.contains(&self.model));
                OllamaStatus {
                    ollama_reachable: true,
                    model_loaded,
                    model: self.model.clone(),
                    available_models: Some(models),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("ollama health check failed: {e}");
                OllamaStatus {
                    ollama_reachable: false,
                    model_loaded: false,
                    model: self.model.clone(),
                    available_models: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Generate a conversational answer grounded in the retrieved movies.
    pub async fn generate(&self, question: &str, movies: &[Movie]) -> String {
        let context = format_movie_context(movies);
        let prompt = format!("MOVIE DATA:\n{context}\n\nUSER QUESTION: {question}");

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: Some(SYSTEM_PROMPT),
            stream: false,
            options: GenerateOptions {
                temperature: 0.7,
                num_predict: 512,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::error!("ollama request timed out after {:?}", self.timeout);
                return "I'm sorry, the language model took too long to respond. \
                        Here's the raw data I found, you can see the 'movies' field in the response."
                    .to_string();
            }
            Err(e) if e.is_connect() => {
                tracing::error!("cannot connect to ollama at {}", self.base_url);
                return "The LLM service (Ollama) is not reachable. \
                        Please ensure Ollama is running. Returning raw movie data."
                    .to_string();
            }
            Err(e) => {
                tracing::error!("ollama request failed: {e}");
                return "LLM service error. Returning raw data instead.".to_string();
            }
        };

        if !response.status().is_success() {
            tracing::error!("ollama HTTP error: {}", response.status());
            return format!(
                "LLM service error ({}). Returning raw data instead.",
                response.status().as_u16()
            );
        }

        match response.json::<GenerateResponse>().await {
            Ok(body) => body.response.trim().to_string(),
            Err(e) => {
                tracing::error!("ollama returned an unreadable body: {e}");
                "LLM service error. Returning raw data instead.".to_string()
            }
        }
    }

    /// Use the LLM to classify a query when regex parsing is uncertain.
    /// Best-effort fallback: any failure yields `None`.
    pub async fn classify_intent(&self, message: &str) -> Option<serde_json::Value> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: LLM_CLASSIFY_PROMPT.replace("{message}", message),
            system: None,
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: 200,
            },
        };

        let result = async {
            let response = self
                .client
                .post(format!("{}/api/generate", self.base_url))
                .timeout(CLASSIFY_TIMEOUT)
                .json(&request)
                .send()
                .await?
                .error_for_status()?;
            let body: GenerateResponse = response.json().await?;
            let parsed: serde_json::Value = serde_json::from_str(body.response.trim())?;
            Ok::<_, anyhow::Error>(parsed)
        }
        .await;

        match result {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!("LLM intent classification failed, falling back: {e}");
                None
            }
        }
    }
}

/// Render the retrieved movies as a compact plain-text block the model can
/// ground its answer in. Caps at 15 movies and 300 chars of plot each.
fn format_movie_context(movies: &[Movie]) -> String {
    if movies.is_empty() {
        return "(No movies found in the database matching the query.)".to_string();
    }

    let mut blocks = Vec::new();
    for movie in movies.iter().take(15) {
        let mut lines = Vec::new();

        let mut header = format!("- {}", movie.title);
        if let Some(year) = movie.year {
            header.push_str(&format!(" ({year})"));
        }
        lines.push(header);

        if let Some(rating) = movie.vote_average {
            lines.push(format!("  Rating: {rating}/10"));
        }
        if !movie.genres.is_empty() {
            lines.push(format!("  Genres: {}", movie.genres.join(", ")));
        }
        if !movie.directors.is_empty() {
            lines.push(format!("  Director(s): {}", movie.directors.join(", ")));
        }
        if !movie.cast.is_empty() {
            let names: Vec<&str> = movie
                .cast
                .iter()
                .take(5)
                .map(|c| c.name.as_str())
                .collect();
            lines.push(format!("  Cast: {}", names.join(", ")));
        }
        if let Some(overview) = &movie.overview {
            let plot: String = overview.chars().take(300).collect();
            lines.push(format!("  Plot: {plot}"));
        }
        if let Some(avg) = movie.user_rating_avg {
            lines.push(format!(
                "  User rating: {avg}/5 ({} ratings)",
                movie.user_rating_count.unwrap_or(0)
            ));
        }

        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::CastMember;

    fn sample_movie() -> Movie {
        Movie {
            id: 1,
            title: "Inception".to_string(),
            year: Some(2010),
            overview: Some("A thief enters dreams.".to_string()),
            runtime: Some(148.0),
            vote_average: Some(8.3),
            vote_count: Some(14000),
            popularity: Some(90.0),
            release_date: Some("2010-07-16".to_string()),
            tagline: None,
            genres: vec!["Action".to_string(), "Science Fiction".to_string()],
            directors: vec!["Christopher Nolan".to_string()],
            cast: vec![CastMember {
                name: "Leonardo DiCaprio".to_string(),
                character: Some("Cobb".to_string()),
            }],
            budget: None,
            revenue: None,
            original_language: None,
            status: None,
            user_rating_avg: Some(4.75),
            user_rating_count: Some(2),
        }
    }

    #[test]
    fn test_context_empty() {
        assert!(format_movie_context(&[]).contains("No movies found"));
    }

    #[test]
    fn test_context_includes_fields() {
        let context = format_movie_context(&[sample_movie()]);
        assert!(context.contains("- Inception (2010)"));
        assert!(context.contains("Rating: 8.3/10"));
        assert!(context.contains("Genres: Action, Science Fiction"));
        assert!(context.contains("Director(s): Christopher Nolan"));
        assert!(context.contains("Cast: Leonardo DiCaprio"));
        assert!(context.contains("User rating: 4.75/5 (2 ratings)"));
    }

    #[test]
    fn test_context_caps_movie_count() {
        let movies: Vec<Movie> = (0..20).map(|_| sample_movie()).collect();
        let context = format_movie_context(&movies);
        assert_eq!(context.matches("- Inception").count(), 15);
    }

    #[test]
    fn test_context_truncates_plot() {
        let mut movie = sample_movie();
        movie.overview = Some("x".repeat(1000));
        let context = format_movie_context(&[movie]);
        let plot_line = context
            .lines()
            .find(|l| l.trim_start().starts_with("Plot:"))
            .unwrap();
        assert!(plot_line.len() <= 300 + "  Plot: ".len());
    }
}
