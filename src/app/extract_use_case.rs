use crate::app::lookup::LookupClient;
use crate::app::ports::{HttpRequest, PacingPort};
use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::error::{Result, ScraperError};
use crate::common::types::{ExtractedMovie, ListingRecord, LlmExtraction};
use crate::observability::metrics;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "\
Given this theater movie listing, read the page and extract the movies being shown.
For each movie, extract the title, directors, and release year.
Return the final result as a JSON object with a `movies` array (`title`, `directors`, `year`, `is_short_film` keys).

Cases to handle:
* The listing is for a single movie. This is the common case. Return a list with a single movie.
* The listing is for an event like a party with no individually credited movies. Return an empty list.
* The listing is for an event with several movies, like a double feature. Return every movie.
* The listing title carries extra context, e.g. \"Staff Pick: The Matrix\". Return the title as \"The Matrix\".

Only include movies that are being shown, not movies merely mentioned on the page.
";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractReport {
    pub listing_count: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failures: usize,
    pub movie_count: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedMovies {
    movies: Vec<ExtractedMovie>,
}

pub struct ExtractUseCase {
    lookup: Arc<LookupClient>,
    pacing: Arc<dyn PacingPort>,
    endpoint: String,
    model: String,
    api_key: String,
    jitter_ms: (u64, u64),
}

impl ExtractUseCase {
    pub fn new(
        lookup: Arc<LookupClient>,
        pacing: Arc<dyn PacingPort>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        jitter_ms: (u64, u64),
    ) -> Self {
        Self {
            lookup,
            pacing,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            jitter_ms,
        }
    }

    /// Chat-completions request body for one listing
    pub fn build_request(&self, record: &ListingRecord) -> HttpRequest {
        let detail = record.detail.clone().unwrap_or_default();
        let page = json!({
            "page_title": record.title,
            "page_year": detail.year,
            "page_directors": detail.directors,
            "page_content": detail.content,
        });

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": serde_json::to_string_pretty(&page).unwrap_or_default()},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "extracted_movies",
                    "strict": true,
                    "schema": movies_schema(),
                },
            },
        });

        HttpRequest::post_json(self.endpoint.as_str(), body).bearer(self.api_key.as_str())
    }

    /// Fill in `llm` for every listing that has detail but no extraction yet
    pub async fn run(&self, snapshot: &mut CalendarSnapshot) -> ExtractReport {
        let mut report = ExtractReport {
            listing_count: snapshot.len(),
            ..ExtractReport::default()
        };

        let keys: Vec<String> = snapshot.keys().cloned().collect();
        let mut calls = 0usize;
        for (index, key) in keys.iter().enumerate() {
            let Some(record) = snapshot.get(key) else { continue };
            if record.llm.is_some() {
                info!(listing = %record.title, index, decision = "reuse", "Listing already extracted");
                report.skipped += 1;
                continue;
            }
            if record.detail.is_none() {
                info!(listing = %record.title, index, "Listing has no detail, skipping extraction");
                report.skipped += 1;
                continue;
            }

            if calls > 0 {
                self.pacing.pause(self.jitter_ms).await;
            }
            calls += 1;

            let title = record.title.clone();
            let request = self.build_request(record);
            let extraction = self
                .lookup
                .execute(&request)
                .await
                .into_option()
                .map(|response| parse_completion(&response.bytes));

            match extraction {
                Some(Ok(extraction)) => {
                    let count = extraction.extracted_movies.len();
                    info!(listing = %title, index, movie_count = count, "Extracted movies");
                    metrics::enrich::movies_extracted(count);
                    report.extracted += 1;
                    report.movie_count += count;
                    if let Some(record) = snapshot.get_mut(key) {
                        record.llm = Some(extraction);
                    }
                }
                Some(Err(e)) => {
                    warn!(listing = %title, index, error = %e, "Unusable completion");
                    report.failures += 1;
                }
                None => {
                    warn!(listing = %title, index, "No completion for listing");
                    report.failures += 1;
                }
            }
        }

        info!(
            listing_count = report.listing_count,
            extracted = report.extracted,
            skipped = report.skipped,
            failures = report.failures,
            movie_count = report.movie_count,
            "Finished extraction"
        );
        report
    }
}

/// Parse `choices[0].message.content` of a chat completion into an extraction
pub fn parse_completion(bytes: &[u8]) -> Result<LlmExtraction> {
    let completion: ChatCompletion = serde_json::from_slice(bytes)?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ScraperError::Api {
            message: "No completions returned".to_string(),
        })?;
    let parsed: ExtractedMovies = serde_json::from_str(&content)?;
    Ok(LlmExtraction {
        extracted_movies: parsed.movies,
    })
}

fn movies_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "movies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Movie title"},
                        "directors": {"type": "string", "description": "Movie directors"},
                        "year": {"type": "integer", "description": "Release year"},
                        "is_short_film": {"type": "boolean", "description": "Is short film"},
                    },
                    "required": ["title", "directors", "year", "is_short_film"],
                    "additionalProperties": false,
                },
            },
        },
        "required": ["movies"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::lookup::testing::*;
    use crate::common::types::ListingDetail;

    fn completion(content: &str) -> std::result::Result<crate::app::ports::HttpResponse, String> {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": content}}]});
        body(&payload.to_string())
    }

    fn with_detail(title: &str, link: &str) -> ListingRecord {
        let mut record = ListingRecord::new(title, link);
        record.detail = Some(ListingDetail {
            year: Some(1982),
            directors: Some("Ridley Scott".to_string()),
            content: Some("<p>Replicants.</p>".to_string()),
        });
        record
    }

    fn use_case(http: Arc<ScriptedHttp>, pacing: Arc<RecordingPacing>) -> ExtractUseCase {
        let lookup = Arc::new(client(http, Arc::new(RecordingSleeper::default()), 3));
        ExtractUseCase::new(lookup, pacing, "https://api.openai.com/v1/chat/completions", "gpt-4o-mini", "sk-test", (50, 100))
    }

    #[test]
    fn test_parse_completion() {
        let payload = json!({"choices": [{"message": {"content":
            r#"{"movies":[{"title":"Blade Runner","directors":"Ridley Scott","year":1982,"is_short_film":false}]}"#}}]});
        let extraction = parse_completion(payload.to_string().as_bytes()).unwrap();
        assert_eq!(extraction.extracted_movies.len(), 1);
        assert_eq!(extraction.extracted_movies[0].title, "Blade Runner");
        assert!(extraction.extracted_movies[0].tmdb.is_none());
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let result = parse_completion(br#"{"choices": []}"#);
        assert!(matches!(result, Err(ScraperError::Api { .. })));
    }

    #[test]
    fn test_request_shape() {
        let http = Arc::new(ScriptedHttp::new(vec![]));
        let extract = use_case(http, Arc::new(RecordingPacing::default()));
        let request = extract.build_request(&with_detail("Blade Runner", "https://roxie.com/film/br/"));

        assert_eq!(request.bearer.as_deref(), Some("sk-test"));
        let body = request.json.unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["response_format"]["type"], "json_schema");
        let user: serde_json::Value = serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
        assert_eq!(user["page_title"], "Blade Runner");
        assert_eq!(user["page_year"], 1982);
    }

    #[tokio::test]
    async fn test_run_skips_extracted_and_detailless_listings() {
        let http = Arc::new(ScriptedHttp::new(vec![
            completion(r#"{"movies":[{"title":"A","directors":"X","year":2001,"is_short_film":false}]}"#),
            status(500),
        ]));
        let pacing = Arc::new(RecordingPacing::default());
        let extract = use_case(http.clone(), pacing.clone());

        let mut done = with_detail("Done", "https://roxie.com/film/done/");
        done.llm = Some(LlmExtraction::default());
        let mut snapshot: CalendarSnapshot = vec![
            with_detail("A", "https://roxie.com/film/a/"),
            done,
            ListingRecord::new("No detail", "https://roxie.com/film/none/"),
            with_detail("Broken", "https://roxie.com/film/broken/"),
        ]
        .into_iter()
        .collect();

        let report = extract.run(&mut snapshot).await;

        assert_eq!(http.calls(), 2);
        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.movie_count, 1);
        assert_eq!(snapshot.get("https://roxie.com/film/a/").unwrap().extracted_movies()[0].year, 2001);
        assert!(snapshot.get("https://roxie.com/film/broken/").unwrap().llm.is_none());
        assert_eq!(*pacing.pauses.lock().unwrap(), vec![(50, 100)]);
    }
}
