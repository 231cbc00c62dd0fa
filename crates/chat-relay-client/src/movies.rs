//! Static movie catalog shown by the movie panel.

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movie {
    /// Title.
    pub title: &'static str,
    /// Release year, when known.
    pub year: Option<u16>,
}

const CATALOG: &[Movie] = &[
    Movie { title: "The Terminator", year: Some(1984) },
    Movie { title: "Aliens", year: Some(1986) },
    Movie { title: "The Abyss", year: Some(1989) },
    Movie { title: "Terminator 2: Judgment Day", year: Some(1991) },
    Movie { title: "True Lies", year: Some(1994) },
    Movie { title: "Titanic", year: Some(1997) },
    Movie { title: "Avatar", year: Some(2009) },
    Movie { title: "Avatar: The Way of Water", year: Some(2022) },
];

/// Panel heading.
pub const TITLE: &str = "James Cameron filmography";

/// The catalog, newest first. Entries without a year go last.
#[must_use]
pub fn newest_first() -> Vec<Movie> {
    let mut movies = CATALOG.to_vec();
    movies.sort_by(|a, b| b.year.unwrap_or(0).cmp(&a.year.unwrap_or(0)));
    movies
}

/// Render the panel as plain text lines.
#[must_use]
pub fn render_panel() -> String {
    let mut out = format!("{TITLE}\n");
    for movie in newest_first() {
        match movie.year {
            Some(year) => out.push_str(&format!("  {year}  {}\n", movie.title)),
            None => out.push_str(&format!("        {}\n", movie.title)),
        }
    }
    out
}
