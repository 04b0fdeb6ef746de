//! Labor-statistics and salary enrichment: fan out per distinct key, join
//! on all calls or the stage deadline, degrade failures to `Unavailable`.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::SalaryRange;
use crate::config::{LABOR_STATS, SALARY};
use crate::interpreter::vocabulary;
use crate::model::{
    Enriched, EnrichmentKey, EnrichmentResult, JobListing, LaborStats, ParsedQuery, SalaryData,
};
use crate::rpc::{RpcError, SubServiceClient};

pub const LABOR_OPERATION: &str = "search_job";
pub const SALARY_OPERATION: &str = "salary_compensation";

/// Enrichment key of a listing: its title and location mapped onto the
/// vocabulary, or the query's own where the listing's text is not recognized.
pub fn key_for(listing: &JobListing, parsed: &ParsedQuery) -> EnrichmentKey {
    EnrichmentKey {
        title: vocabulary::find_title(&listing.title)
            .map(|(title, _)| title.to_string())
            .unwrap_or_else(|| parsed.title.clone()),
        location: vocabulary::find_location(&listing.location)
            .unwrap_or_else(|| parsed.location.clone()),
    }
}

/// Distinct keys over `listings`, in stable order.
pub fn distinct_keys(listings: &[JobListing], parsed: &ParsedQuery) -> BTreeSet<EnrichmentKey> {
    listings.iter().map(|listing| key_for(listing, parsed)).collect()
}

/// One enrichment call that did not produce data.
#[derive(Debug, Clone, PartialEq)]
pub struct Degradation {
    pub key: EnrichmentKey,
    pub service: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutcome {
    pub results: Vec<EnrichmentResult>,
    pub degraded: Vec<Degradation>,
}

#[derive(Debug, Deserialize)]
struct LaborReply {
    occupation: String,
    #[serde(default)]
    median_pay: Option<Value>,
    #[serde(default)]
    url: Option<String>,
}

impl LaborReply {
    fn into_stats(self) -> LaborStats {
        let median_annual = match self.median_pay {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(text)) => SalaryRange::parse(&text).map(|r| r.annual().midpoint()),
            _ => None,
        };
        LaborStats {
            occupation: self.occupation,
            median_annual,
            url: self.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SalaryReply {
    #[serde(default)]
    min_annual: Option<f64>,
    #[serde(default)]
    max_annual: Option<f64>,
    #[serde(default)]
    median_annual: Option<f64>,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Enrich every key concurrently.
///
/// Labor statistics are looked up once per distinct title, salaries once per
/// key. Every call is bounded by `deadline`. Returns `None` if `cancel`
/// fires first; in-flight calls are dropped with it.
pub async fn enrich(
    client: &SubServiceClient,
    keys: &BTreeSet<EnrichmentKey>,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Option<EnrichmentOutcome> {
    let titles: BTreeSet<&str> = keys.iter().map(|key| key.title.as_str()).collect();

    let labor_calls = titles.iter().map(|title| async move {
        let result = bounded(
            deadline,
            LABOR_STATS,
            client.call_as::<LaborReply>(LABOR_STATS, LABOR_OPERATION, json!({ "title": title }), None),
        )
        .await
        .map(LaborReply::into_stats);
        (*title, result)
    });

    let salary_calls = keys.iter().map(|key| async move {
        let result = bounded(
            deadline,
            SALARY,
            client.call_as::<SalaryReply>(
                SALARY,
                SALARY_OPERATION,
                json!({ "title": key.title, "location": key.location }),
                None,
            ),
        )
        .await
        .map(|reply| SalaryData {
            min_annual: reply.min_annual,
            max_annual: reply.max_annual,
            median_annual: reply.median_annual,
            currency: reply.currency,
        });
        (key, result)
    });

    let (labor, salary) = tokio::select! {
        _ = cancel.cancelled() => return None,
        joined = futures::future::join(join_all(labor_calls), join_all(salary_calls)) => joined,
    };

    let labor: BTreeMap<&str, Result<LaborStats, String>> = labor.into_iter().collect();
    let mut outcome = EnrichmentOutcome::default();

    for (key, salary) in salary {
        let labor = match labor.get(key.title.as_str()) {
            Some(Ok(stats)) => Enriched::Available {
                data: stats.clone(),
            },
            Some(Err(reason)) => {
                outcome.degraded.push(Degradation {
                    key: key.clone(),
                    service: LABOR_STATS,
                    reason: reason.clone(),
                });
                Enriched::Unavailable {
                    reason: reason.clone(),
                }
            }
            None => Enriched::Unavailable {
                reason: "not requested".to_string(),
            },
        };
        let salary = match salary {
            Ok(data) => Enriched::Available { data },
            Err(reason) => {
                outcome.degraded.push(Degradation {
                    key: key.clone(),
                    service: SALARY,
                    reason: reason.clone(),
                });
                Enriched::Unavailable { reason }
            }
        };
        outcome.results.push(EnrichmentResult {
            key: key.clone(),
            labor,
            salary,
        });
    }

    for degradation in &outcome.degraded {
        warn!(
            key = %degradation.key,
            service = degradation.service,
            reason = %degradation.reason,
            "enrichment degraded"
        );
    }
    debug!(
        keys = keys.len(),
        degraded = outcome.degraded.len(),
        "enrichment finished"
    );

    Some(outcome)
}

async fn bounded<T>(
    deadline: Instant,
    service: &str,
    call: impl std::future::Future<Output = Result<T, RpcError>>,
) -> Result<T, String> {
    match tokio::time::timeout_at(deadline, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("{service} did not answer before the enrichment deadline")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::model::QuerySource;
    use crate::registry::ServerRegistry;
    use crate::testing::{envelope_err, envelope_ok, ScriptedTransport, Step};
    use chrono::Utc;

    fn parsed() -> ParsedQuery {
        ParsedQuery {
            title: "Software Engineer".into(),
            location: "Austin, TX".into(),
            confidence: 0.9,
            source: QuerySource::Primary,
            low_confidence: false,
        }
    }

    fn listing(title: &str, location: &str) -> JobListing {
        JobListing {
            title: title.into(),
            company: "Acme".into(),
            location: location.into(),
            salary_range: None,
            url: "https://jobs.example/1".into(),
            scraped_at: Utc::now(),
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> SubServiceClient {
        let registry = Arc::new(ServerRegistry::new(Duration::from_secs(1)));
        registry.register(LABOR_STATS, "http://labor", vec![]);
        registry.register(SALARY, "http://salary", vec![]);
        SubServiceClient::new(registry, transport)
    }

    fn healthy(transport: &ScriptedTransport) {
        transport.on(LABOR_STATS, |req, _| {
            Step::Reply(envelope_ok(json!({
                "occupation": req.payload["title"],
                "median_pay": "$98,220 per year"
            })))
        });
        transport.on(SALARY, |_, _| {
            Step::Reply(envelope_ok(json!({"min_annual": 90000.0, "max_annual": 150000.0})))
        });
    }

    #[test]
    fn keys_fall_back_to_query_fields() {
        let parsed = parsed();
        let keys = distinct_keys(
            &[
                listing("Senior Software Engineer II", "Austin, TX"),
                listing("Backend Engineer", "Hybrid - Austin, TX 78701"),
                listing("Registered Nurse", "Remote"),
            ],
            &parsed,
        );
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "Registered Nurse in Remote",
                "Software Engineer in Austin, TX",
            ]
        );
    }

    #[tokio::test]
    async fn enriches_every_key() {
        let transport = ScriptedTransport::new();
        healthy(&transport);
        let keys = distinct_keys(&[listing("Software Engineer", "Austin, TX")], &parsed());

        let outcome = enrich(
            &client(transport),
            &keys,
            Instant::now() + Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.degraded.is_empty());
        let result = &outcome.results[0];
        assert!(result.fully_available());
        assert_eq!(result.labor.data().unwrap().median_annual, Some(98_220.0));
        assert_eq!(result.salary.data().unwrap().currency, "USD");
    }

    #[tokio::test]
    async fn one_failing_source_degrades_only_that_source() {
        let transport = ScriptedTransport::new();
        healthy(&transport);
        transport.on(SALARY, |req, _| {
            if req.payload["location"] == "Denver, CO" {
                Step::Reply(envelope_err("rejected"))
            } else {
                Step::Reply(envelope_ok(json!({"median_annual": 120000.0, "currency": "USD"})))
            }
        });
        let keys = distinct_keys(
            &[
                listing("Software Engineer", "Austin, TX"),
                listing("Software Engineer", "Denver, CO"),
            ],
            &parsed(),
        );

        let outcome = enrich(
            &client(transport.clone()),
            &keys,
            Instant::now() + Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.degraded.len(), 1);
        assert_eq!(outcome.degraded[0].service, SALARY);
        assert_eq!(outcome.degraded[0].key.location, "Denver, CO");
        assert!(outcome.results.iter().all(|r| r.labor.is_available()));
        // one labor lookup for the shared title
        assert_eq!(transport.calls(LABOR_STATS).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_deadline_bounds_slow_calls() {
        let transport = ScriptedTransport::new();
        healthy(&transport);
        transport.on(LABOR_STATS, |_, _| Step::Hang);
        let keys = distinct_keys(&[listing("Software Engineer", "Austin, TX")], &parsed());

        let started = Instant::now();
        let outcome = enrich(
            &client(transport),
            &keys,
            started + Duration::from_secs(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(started.elapsed() <= Duration::from_secs(3));
        assert!(!outcome.results[0].labor.is_available());
        assert!(outcome.results[0].salary.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_promptly() {
        let transport = ScriptedTransport::new();
        transport.on(LABOR_STATS, |_, _| Step::Hang);
        transport.on(SALARY, |_, _| Step::Hang);
        let keys = distinct_keys(&[listing("Software Engineer", "Austin, TX")], &parsed());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = enrich(
            &client(transport),
            &keys,
            started + Duration::from_secs(60),
            &cancel,
        )
        .await;
        assert!(outcome.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
