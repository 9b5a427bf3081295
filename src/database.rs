use anyhow::Result;
use rusqlite::{params, params_from_iter, types::Value, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task;

/// Schema for the movie database. `setup-db` applies it when building from
/// the raw CSV dumps; tests apply it to throwaway fixture databases.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS movies (
    id              INTEGER PRIMARY KEY,
    title           TEXT NOT NULL,
    year            INTEGER,
    overview        TEXT,
    runtime         REAL,
    budget          INTEGER,
    revenue         INTEGER,
    popularity      REAL,
    vote_average    REAL,
    vote_count      INTEGER,
    original_language TEXT,
    tagline         TEXT,
    status          TEXT,
    release_date    TEXT
);

CREATE TABLE IF NOT EXISTS genres (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS movie_genres (
    movie_id INTEGER NOT NULL REFERENCES movies(id),
    genre_id INTEGER NOT NULL REFERENCES genres(id),
    PRIMARY KEY (movie_id, genre_id)
);

CREATE TABLE IF NOT EXISTS cast_members (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    movie_id   INTEGER NOT NULL REFERENCES movies(id),
    name       TEXT NOT NULL,
    character  TEXT,
    cast_order INTEGER
);

CREATE TABLE IF NOT EXISTS directors (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    movie_id INTEGER NOT NULL REFERENCES movies(id),
    name     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ratings (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    movie_id  INTEGER NOT NULL REFERENCES movies(id),
    user_id   INTEGER NOT NULL,
    rating    REAL NOT NULL,
    timestamp INTEGER
);

CREATE INDEX IF NOT EXISTS idx_movies_title        ON movies(title);
CREATE INDEX IF NOT EXISTS idx_movie_genres_movie  ON movie_genres(movie_id);
CREATE INDEX IF NOT EXISTS idx_movie_genres_genre  ON movie_genres(genre_id);
CREATE INDEX IF NOT EXISTS idx_cast_members_movie  ON cast_members(movie_id);
CREATE INDEX IF NOT EXISTS idx_directors_movie     ON directors(movie_id);
CREATE INDEX IF NOT EXISTS idx_ratings_movie       ON ratings(movie_id);
";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub character: Option<String>,
}

/// One movie record. Summary fields are always populated; the detail-only
/// fields stay `None` on list queries and are omitted from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: Option<i64>,
    pub overview: Option<String>,
    pub runtime: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub popularity: Option<f64>,
    pub release_date: Option<String>,
    pub tagline: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MovieFilters {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub director: Option<String>,
    pub actor: Option<String>,
    pub sort_by: String,
    pub limit: usize,
    pub offset: usize,
}

impl Default for MovieFilters {
    fn default() -> Self {
        Self {
            title: None,
            genre: None,
            year: None,
            year_from: None,
            year_to: None,
            director: None,
            actor: None,
            sort_by: "popularity".to_string(),
            limit: 20,
            offset: 0,
        }
    }
}

/// Whitelisted ORDER BY clauses; anything unknown falls back to popularity.
fn order_clause(sort_by: &str) -> &'static str {
    match sort_by {
        "rating" => "m.vote_average DESC",
        "year" => "m.year DESC",
        "title" => "m.title ASC",
        "revenue" => "m.revenue DESC",
        _ => "m.popularity DESC",
    }
}

/// SQLite movie store. Holds only the database path; every operation opens
/// a connection inside `spawn_blocking` so the async runtime never blocks
/// on disk I/O.
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub async fn health_check(&self) -> bool {
        let db_path = self.db_path.clone();
        let result = task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare("SELECT 1 FROM movies LIMIT 1")?;
            let mut rows = stmt.query([])?;
            let _ = rows.next()?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("database health check failed: {e}");
                false
            }
            Err(e) => {
                tracing::warn!("database health check task failed: {e}");
                false
            }
        }
    }

    pub async fn search_movies(&self, filters: MovieFilters) -> Result<Vec<Movie>> {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || -> Result<Vec<Movie>> {
            let conn = Connection::open(&db_path)?;

            let mut clauses: Vec<&str> = Vec::new();
            let mut params: Vec<Value> = Vec::new();

            if let Some(title) = &filters.title {
                clauses.push("m.title LIKE ?");
                params.push(Value::Text(format!("%{title}%")));
            }
            if let Some(genre) = &filters.genre {
                clauses.push(
                    "m.id IN (SELECT mg.movie_id FROM movie_genres mg \
                     JOIN genres g ON g.id = mg.genre_id WHERE g.name LIKE ?)",
                );
                params.push(Value::Text(format!("%{genre}%")));
            }
            if let Some(year) = filters.year {
                clauses.push("m.year = ?");
                params.push(Value::Integer(year.into()));
            }
            if let Some(year_from) = filters.year_from {
                clauses.push("m.year >= ?");
                params.push(Value::Integer(year_from.into()));
            }
            if let Some(year_to) = filters.year_to {
                clauses.push("m.year <= ?");
                params.push(Value::Integer(year_to.into()));
            }
            if let Some(director) = &filters.director {
                clauses.push("m.id IN (SELECT d.movie_id FROM directors d WHERE d.name LIKE ?)");
                params.push(Value::Text(format!("%{director}%")));
            }
            if let Some(actor) = &filters.actor {
                clauses.push("m.id IN (SELECT c.movie_id FROM cast_members c WHERE c.name LIKE ?)");
                params.push(Value::Text(format!("%{actor}%")));
            }

            let where_clause = if clauses.is_empty() {
                "1=1".to_string()
            } else {
                clauses.join(" AND ")
            };
            let order = order_clause(&filters.sort_by);

            let sql = format!(
                "SELECT m.id, m.title, m.year, m.overview, m.runtime, \
                        m.vote_average, m.vote_count, m.popularity, m.release_date, m.tagline \
                 FROM movies m \
                 WHERE {where_clause} \
                 ORDER BY {order} \
                 LIMIT ? OFFSET ?"
            );
            params.push(Value::Integer(filters.limit as i64));
            params.push(Value::Integer(filters.offset as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), |row| {
                Ok(Movie {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    year: row.get(2)?,
                    overview: row.get(3)?,
                    runtime: row.get(4)?,
                    vote_average: row.get(5)?,
                    vote_count: row.get(6)?,
                    popularity: row.get(7)?,
                    release_date: row.get(8)?,
                    tagline: row.get(9)?,
                    genres: Vec::new(),
                    directors: Vec::new(),
                    cast: Vec::new(),
                    budget: None,
                    revenue: None,
                    original_language: None,
                    status: None,
                    user_rating_avg: None,
                    user_rating_count: None,
                })
            })?;

            let mut movies = Vec::new();
            for row in rows {
                let mut movie = row?;
                enrich_movie(&conn, &mut movie, 5)?;
                movies.push(movie);
            }

            Ok(movies)
        })
        .await?
    }

    /// Full record for a single movie: credits, genres, and the MovieLens
    /// user-rating aggregate.
    pub async fn get_movie_detail(&self, movie_id: i64) -> Result<Option<Movie>> {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || -> Result<Option<Movie>> {
            let conn = Connection::open(&db_path)?;

            let mut stmt = conn.prepare(
                "SELECT m.id, m.title, m.year, m.overview, m.runtime, \
                        m.vote_average, m.vote_count, m.popularity, m.release_date, m.tagline, \
                        m.budget, m.revenue, m.original_language, m.status \
                 FROM movies m WHERE m.id = ?1",
            )?;
            let result = stmt.query_row(params![movie_id], |row| {
                Ok(Movie {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    year: row.get(2)?,
                    overview: row.get(3)?,
                    runtime: row.get(4)?,
                    vote_average: row.get(5)?,
                    vote_count: row.get(6)?,
                    popularity: row.get(7)?,
                    release_date: row.get(8)?,
                    tagline: row.get(9)?,
                    genres: Vec::new(),
                    directors: Vec::new(),
                    cast: Vec::new(),
                    budget: row.get(10)?,
                    revenue: row.get(11)?,
                    original_language: row.get(12)?,
                    status: row.get(13)?,
                    user_rating_avg: None,
                    user_rating_count: None,
                })
            });

            let mut movie = match result {
                Ok(movie) => movie,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            enrich_movie(&conn, &mut movie, 10)?;

            let (avg, count): (Option<f64>, i64) = conn.query_row(
                "SELECT AVG(rating), COUNT(*) FROM ratings WHERE movie_id = ?1",
                params![movie_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            movie.user_rating_avg = avg.map(|a| (a * 100.0).round() / 100.0);
            movie.user_rating_count = Some(count);

            Ok(Some(movie))
        })
        .await?
    }

    pub async fn get_top_rated(
        &self,
        genre: Option<String>,
        year: Option<i32>,
        limit: usize,
    ) -> Result<Vec<Movie>> {
        self.search_movies(MovieFilters {
            genre,
            year,
            sort_by: "rating".to_string(),
            limit,
            ..Default::default()
        })
        .await
    }

    /// Find movies where a person appears as cast or director.
    pub async fn get_movies_by_person(&self, name: &str, limit: usize) -> Result<Vec<Movie>> {
        let db_path = self.db_path.clone();
        let name = name.to_string();

        let movie_ids = task::spawn_blocking(move || -> Result<Vec<i64>> {
            let conn = Connection::open(&db_path)?;
            let pattern = format!("%{name}%");
            let mut stmt = conn.prepare(
                "SELECT DISTINCT movie_id FROM ( \
                   SELECT movie_id FROM cast_members WHERE name LIKE ?1 \
                   UNION \
                   SELECT movie_id FROM directors WHERE name LIKE ?2 \
                 ) sub LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![pattern, pattern, limit as i64], |row| row.get(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await??;

        let mut movies = Vec::new();
        for movie_id in movie_ids {
            if let Some(detail) = self.get_movie_detail(movie_id).await? {
                movies.push(detail);
            }
        }
        Ok(movies)
    }

    pub async fn get_genres(&self) -> Result<Vec<String>> {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare("SELECT name FROM genres ORDER BY name")?;
            let rows = stmt.query_map([], |row| row.get(0))?;

            let mut genres = Vec::new();
            for row in rows {
                genres.push(row?);
            }
            Ok(genres)
        })
        .await?
    }
}

/// Attach genres, directors, and the top of the cast list to a movie row.
fn enrich_movie(conn: &Connection, movie: &mut Movie, cast_limit: usize) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT g.name FROM genres g \
         JOIN movie_genres mg ON g.id = mg.genre_id \
         WHERE mg.movie_id = ?1",
    )?;
    let rows = stmt.query_map(params![movie.id], |row| row.get(0))?;
    for row in rows {
        movie.genres.push(row?);
    }

    let mut stmt = conn.prepare("SELECT name FROM directors WHERE movie_id = ?1")?;
    let rows = stmt.query_map(params![movie.id], |row| row.get(0))?;
    for row in rows {
        movie.directors.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT name, character FROM cast_members \
         WHERE movie_id = ?1 ORDER BY cast_order LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![movie.id, cast_limit as i64], |row| {
        Ok(CastMember {
            name: row.get(0)?,
            character: row.get(1)?,
        })
    })?;
    for row in rows {
        movie.cast.push(row?);
    }

    Ok(())
}

#[cfg(test)]
pub mod test_fixtures {
    use super::*;

    /// Build a small fixture database with three movies, credits, and
    /// ratings, returning its path. The TempDir must be kept alive by the
    /// caller.
    pub fn fixture_db(dir: &std::path::Path) -> PathBuf {
        let db_path = dir.join("movies.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        conn.execute_batch(
            "INSERT INTO movies (id, title, year, overview, runtime, budget, revenue, popularity,
                                 vote_average, vote_count, original_language, tagline, status, release_date)
             VALUES
               (1, 'Inception', 2010, 'A thief enters dreams.', 148.0, 160000000, 825532764, 90.0,
                8.3, 14000, 'en', 'Your mind is the scene of the crime.', 'Released', '2010-07-16'),
               (2, 'The Dark Knight', 2008, 'Batman faces the Joker.', 152.0, 185000000, 1004558444, 95.0,
                8.5, 12000, 'en', 'Why so serious?', 'Released', '2008-07-18'),
               (3, 'Cloudy Skies', 1998, 'A quiet drama.', 101.0, NULL, NULL, 3.0,
                5.9, 200, 'en', NULL, 'Released', '1998-03-02');

             INSERT INTO genres (id, name) VALUES (28, 'Action'), (18, 'Drama'), (878, 'Science Fiction');

             INSERT INTO movie_genres (movie_id, genre_id) VALUES
               (1, 28), (1, 878), (2, 28), (2, 18), (3, 18);

             INSERT INTO cast_members (movie_id, name, character, cast_order) VALUES
               (1, 'Leonardo DiCaprio', 'Cobb', 0),
               (1, 'Joseph Gordon-Levitt', 'Arthur', 1),
               (2, 'Christian Bale', 'Bruce Wayne', 0),
               (2, 'Heath Ledger', 'Joker', 1),
               (3, 'Jane Doe', 'Ava', 0);

             INSERT INTO directors (movie_id, name) VALUES
               (1, 'Christopher Nolan'),
               (2, 'Christopher Nolan'),
               (3, 'Sam Smith');

             INSERT INTO ratings (movie_id, user_id, rating, timestamp) VALUES
               (1, 1, 4.5, 1000), (1, 2, 5.0, 1001), (2, 1, 5.0, 1002);",
        )
        .unwrap();

        db_path
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::fixture_db;
    use super::*;

    #[tokio::test]
    async fn test_search_by_title() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movies = db
            .search_movies(MovieFilters {
                title: Some("Inception".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Inception");
        assert!(movies[0].genres.contains(&"Science Fiction".to_string()));
        assert_eq!(movies[0].directors, vec!["Christopher Nolan"]);
        assert_eq!(movies[0].cast[0].name, "Leonardo DiCaprio");
    }

    #[tokio::test]
    async fn test_search_by_genre_sorted_by_rating() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movies = db
            .search_movies(MovieFilters {
                genre: Some("Action".to_string()),
                sort_by: "rating".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].title, "The Dark Knight");
        assert_eq!(movies[1].title, "Inception");
    }

    #[tokio::test]
    async fn test_search_year_range() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movies = db
            .search_movies(MovieFilters {
                year_from: Some(2000),
                year_to: Some(2009),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "The Dark Knight");
    }

    #[tokio::test]
    async fn test_unknown_sort_falls_back_to_popularity() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movies = db
            .search_movies(MovieFilters {
                sort_by: "m.title; DROP TABLE movies".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(movies[0].title, "The Dark Knight");
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_detail_includes_ratings_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movie = db.get_movie_detail(1).await.unwrap().unwrap();
        assert_eq!(movie.user_rating_avg, Some(4.75));
        assert_eq!(movie.user_rating_count, Some(2));
        assert_eq!(movie.budget, Some(160000000));
        assert_eq!(movie.cast.len(), 2);
    }

    #[tokio::test]
    async fn test_detail_missing_movie_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        assert!(db.get_movie_detail(999999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_movies_by_person_matches_director_and_cast() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let movies = db.get_movies_by_person("Nolan", 10).await.unwrap();
        assert_eq!(movies.len(), 2);

        let movies = db.get_movies_by_person("Heath Ledger", 10).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "The Dark Knight");
    }

    #[tokio::test]
    async fn test_get_genres_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(fixture_db(dir.path()));

        let genres = db.get_genres().await.unwrap();
        assert_eq!(genres, vec!["Action", "Drama", "Science Fiction"]);
    }

    #[tokio::test]
    async fn test_health_check_missing_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nope.db"));
        assert!(!db.health_check().await);
    }
}
