use anyhow::{bail, Context, Result};
use clap::Parser;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use movie_agent_backend::database::SCHEMA_SQL;

const MAX_CAST_PER_MOVIE: usize = 10;
const RATINGS_BATCH_SIZE: usize = 5000;

/// Build a normalized SQLite database from the TMDB 5000 + MovieLens dumps.
///
/// Expected layout under the data directory:
///   tmdb5000/tmdb_5000_movies.csv
///   tmdb5000/tmdb_5000_credits.csv
///   ml-latest-small/ratings.csv
///   ml-latest-small/links.csv
#[derive(Debug, Parser)]
#[command(name = "setup-db", version)]
struct Cli {
    /// Directory containing the raw CSV dumps
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Output database path
    #[arg(long, default_value = "movies.db")]
    db_path: PathBuf,
}

fn parse_year(release_date: &str) -> Option<i64> {
    release_date.get(..4).and_then(|y| y.parse().ok())
}

fn safe_json_array(text: &str) -> Vec<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}

fn opt_str(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    let value = record.get(idx?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn opt_parse<T: std::str::FromStr>(record: &csv::StringRecord, idx: Option<usize>) -> Option<T> {
    opt_str(record, idx).and_then(|v| v.parse().ok())
}

/// Column lookup by header name, so the loaders survive column reordering
/// in the dumps.
struct Columns {
    by_name: HashMap<String, usize>,
}

impl Columns {
    fn from_reader(reader: &mut csv::Reader<std::fs::File>) -> Result<Self> {
        let headers = reader.headers()?;
        let by_name = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Ok(Self { by_name })
    }

    fn idx(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

/// tmdb_5000_movies.csv -> movies + genres + movie_genres.
/// Returns the set of loaded movie ids.
fn load_movies_and_genres(conn: &Connection, path: &Path) -> Result<HashSet<i64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let cols = Columns::from_reader(&mut reader)?;

    let mut movie_ids = HashSet::new();
    let mut seen_genres: HashSet<i64> = HashSet::new();

    for record in reader.records() {
        let record = record?;

        let movie_id: i64 = match opt_parse(&record, cols.idx("id")) {
            Some(id) => id,
            None => continue,
        };
        let title = match opt_str(&record, cols.idx("title")) {
            Some(t) => t,
            None => continue,
        };
        movie_ids.insert(movie_id);

        let release_date = opt_str(&record, cols.idx("release_date"));
        let year = release_date.as_deref().and_then(parse_year);

        conn.execute(
            "INSERT OR IGNORE INTO movies
               (id, title, year, overview, runtime, budget, revenue,
                popularity, vote_average, vote_count, original_language,
                tagline, status, release_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                movie_id,
                title,
                year,
                opt_str(&record, cols.idx("overview")),
                opt_parse::<f64>(&record, cols.idx("runtime")),
                opt_parse::<i64>(&record, cols.idx("budget")),
                opt_parse::<i64>(&record, cols.idx("revenue")),
                opt_parse::<f64>(&record, cols.idx("popularity")),
                opt_parse::<f64>(&record, cols.idx("vote_average")),
                opt_parse::<i64>(&record, cols.idx("vote_count")),
                opt_str(&record, cols.idx("original_language")),
                opt_str(&record, cols.idx("tagline")),
                opt_str(&record, cols.idx("status")),
                release_date,
            ],
        )?;

        let genres_json = opt_str(&record, cols.idx("genres")).unwrap_or_default();
        for genre in safe_json_array(&genres_json) {
            let (Some(gid), Some(gname)) = (
                genre.get("id").and_then(|v| v.as_i64()),
                genre.get("name").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if seen_genres.insert(gid) {
                conn.execute(
                    "INSERT OR IGNORE INTO genres (id, name) VALUES (?1, ?2)",
                    params![gid, gname],
                )?;
            }
            conn.execute(
                "INSERT OR IGNORE INTO movie_genres (movie_id, genre_id) VALUES (?1, ?2)",
                params![movie_id, gid],
            )?;
        }
    }

    Ok(movie_ids)
}

/// tmdb_5000_credits.csv -> cast_members + directors.
fn load_credits(conn: &Connection, path: &Path, movie_ids: &HashSet<i64>) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let cols = Columns::from_reader(&mut reader)?;

    for record in reader.records() {
        let record = record?;

        let movie_id: i64 = match opt_parse(&record, cols.idx("movie_id")) {
            Some(id) => id,
            None => continue,
        };
        if !movie_ids.contains(&movie_id) {
            continue;
        }

        let cast_json = opt_str(&record, cols.idx("cast")).unwrap_or_default();
        let mut cast = safe_json_array(&cast_json);
        cast.sort_by_key(|c| c.get("order").and_then(|v| v.as_i64()).unwrap_or(9999));
        for member in cast.iter().take(MAX_CAST_PER_MOVIE) {
            let Some(name) = member.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            conn.execute(
                "INSERT INTO cast_members (movie_id, name, character, cast_order) VALUES (?1,?2,?3,?4)",
                params![
                    movie_id,
                    name,
                    member.get("character").and_then(|v| v.as_str()),
                    member.get("order").and_then(|v| v.as_i64()),
                ],
            )?;
        }

        let crew_json = opt_str(&record, cols.idx("crew")).unwrap_or_default();
        for person in safe_json_array(&crew_json) {
            if person.get("job").and_then(|v| v.as_str()) != Some("Director") {
                continue;
            }
            let Some(name) = person.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            conn.execute(
                "INSERT INTO directors (movie_id, name) VALUES (?1, ?2)",
                params![movie_id, name],
            )?;
        }
    }

    Ok(())
}

/// links.csv: MovieLens movieId -> TMDB id.
fn build_ml_to_tmdb_map(path: &Path) -> Result<HashMap<i64, i64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let cols = Columns::from_reader(&mut reader)?;

    let mut mapping = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let (Some(ml_id), Some(tmdb_raw)) = (
            opt_parse::<i64>(&record, cols.idx("movieId")),
            opt_str(&record, cols.idx("tmdbId")),
        ) else {
            continue;
        };
        // The dump stores tmdbId as a float-formatted string
        if let Ok(tmdb_id) = tmdb_raw.parse::<f64>() {
            mapping.insert(ml_id, tmdb_id as i64);
        }
    }
    Ok(mapping)
}

/// ratings.csv -> ratings table, keyed by TMDB id. Returns inserted count.
fn load_ratings(
    conn: &Connection,
    ratings_path: &Path,
    links_path: &Path,
    movie_ids: &HashSet<i64>,
) -> Result<usize> {
    let ml_to_tmdb = build_ml_to_tmdb_map(links_path)?;

    let mut reader = csv::Reader::from_path(ratings_path)
        .with_context(|| format!("opening {}", ratings_path.display()))?;
    let cols = Columns::from_reader(&mut reader)?;

    let mut inserted = 0usize;
    let mut batch: Vec<(i64, i64, f64, i64)> = Vec::new();

    let mut flush = |batch: &mut Vec<(i64, i64, f64, i64)>| -> Result<usize> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO ratings (movie_id, user_id, rating, timestamp) VALUES (?1,?2,?3,?4)",
        )?;
        let n = batch.len();
        for (movie_id, user_id, rating, timestamp) in batch.drain(..) {
            stmt.execute(params![movie_id, user_id, rating, timestamp])?;
        }
        Ok(n)
    };

    for record in reader.records() {
        let record = record?;
        let (Some(ml_movie_id), Some(user_id), Some(rating), Some(timestamp)) = (
            opt_parse::<i64>(&record, cols.idx("movieId")),
            opt_parse::<i64>(&record, cols.idx("userId")),
            opt_parse::<f64>(&record, cols.idx("rating")),
            opt_parse::<i64>(&record, cols.idx("timestamp")),
        ) else {
            continue;
        };

        let Some(&tmdb_id) = ml_to_tmdb.get(&ml_movie_id) else {
            continue;
        };
        if !movie_ids.contains(&tmdb_id) {
            continue;
        }

        batch.push((tmdb_id, user_id, rating, timestamp));
        if batch.len() >= RATINGS_BATCH_SIZE {
            inserted += flush(&mut batch)?;
        }
    }
    inserted += flush(&mut batch)?;

    Ok(inserted)
}

fn print_summary(conn: &Connection) -> Result<()> {
    println!("\n=== Database Summary ===");
    for table in [
        "movies",
        "genres",
        "movie_genres",
        "cast_members",
        "directors",
        "ratings",
    ] {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        println!("  {table:20}: {count:>8} rows");
    }

    println!("\n=== Sample: Top 5 highest-rated movies (min 50 votes) ===");
    let mut stmt = conn.prepare(
        "SELECT m.title, m.year, m.vote_average,
                GROUP_CONCAT(DISTINCT g.name),
                GROUP_CONCAT(DISTINCT d.name)
         FROM movies m
         LEFT JOIN movie_genres mg ON mg.movie_id = m.id
         LEFT JOIN genres g ON g.id = mg.genre_id
         LEFT JOIN directors d ON d.movie_id = m.id
         WHERE m.vote_count >= 50
         GROUP BY m.id
         ORDER BY m.vote_average DESC
         LIMIT 5",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;
    for row in rows {
        let (title, year, avg, genres, directors) = row?;
        println!(
            "  {title} ({}) — {}/10 | Genres: {} | Director(s): {}",
            year.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
            avg.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
            genres.unwrap_or_default(),
            directors.unwrap_or_default(),
        );
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let movies_csv = cli.data_dir.join("tmdb5000/tmdb_5000_movies.csv");
    let credits_csv = cli.data_dir.join("tmdb5000/tmdb_5000_credits.csv");
    let ratings_csv = cli.data_dir.join("ml-latest-small/ratings.csv");
    let links_csv = cli.data_dir.join("ml-latest-small/links.csv");

    for path in [&movies_csv, &credits_csv, &ratings_csv, &links_csv] {
        if !path.exists() {
            bail!("missing data file: {}", path.display());
        }
    }

    if cli.db_path.exists() {
        std::fs::remove_file(&cli.db_path)?;
        println!("Removed existing {}", cli.db_path.display());
    }

    let start = Instant::now();
    let conn = Connection::open(&cli.db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    println!("Creating schema...");
    conn.execute_batch(SCHEMA_SQL)?;

    println!("Loading movies & genres...");
    let movie_ids = load_movies_and_genres(&conn, &movies_csv)?;
    println!("  Loaded {} movies", movie_ids.len());

    println!("Loading cast & directors...");
    load_credits(&conn, &credits_csv, &movie_ids)?;

    println!("Loading ratings (MovieLens -> TMDB mapping)...");
    let n_ratings = load_ratings(&conn, &ratings_csv, &links_csv, &movie_ids)?;
    println!("  Linked {n_ratings} ratings");

    print_summary(&conn)?;

    println!(
        "\nDone. Database written to {}  ({:.1}s)",
        cli.db_path.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
