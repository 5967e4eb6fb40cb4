//! Traffic tables, graphs and overview plugins over SQLite storage

use chrono::{Duration, Utc};
use hitcount::classify::{Classifier, NoopHostnameResolver};
use hitcount::models::NewRequest;
use hitcount::plugins::{PluginContext, PluginReport, Plugins, RankedValue};
use hitcount::query::{RequestQuery, TimeWindow};
use hitcount::storage::{RequestStorage, SqliteStorage};
use hitcount::traffic::{sample_days, ModuleContext, Modules};
use hitcount::{ConfigurationError, TrafficError};
use std::sync::Arc;

const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";
const CHROME: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

async fn create_test_storage() -> Arc<dyn RequestStorage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn request(path: &str, status: u16, ip: &str) -> NewRequest {
    NewRequest {
        path: path.into(),
        full_path: path.into(),
        status_code: status,
        ip: ip.into(),
        ..Default::default()
    }
}

/// Seven requests logged just now, plus one from two years ago.
async fn seeded() -> Arc<dyn RequestStorage> {
    let storage = create_test_storage().await;
    let requests = vec![
        NewRequest {
            user_agent: Some(FIREFOX.into()),
            referer: Some("https://www.google.com/search?q=traffic+reports".into()),
            ..request("/", 200, "10.0.0.1")
        },
        NewRequest {
            user_agent: Some(FIREFOX.into()),
            referer: Some("https://www.google.com/search?q=traffic+reports".into()),
            ..request("/blog/", 200, "10.0.0.2")
        },
        NewRequest {
            user_agent: Some(CHROME.into()),
            referer: Some("https://search.yahoo.com/search?p=hitcount".into()),
            ..request("/blog/", 200, "10.0.0.3")
        },
        NewRequest {
            user_agent: Some(FIREFOX.into()),
            referer: Some("http://127.0.0.1/blog/".into()),
            user_id: Some(42),
            ..request("/about", 200, "10.0.0.1")
        },
        NewRequest {
            referer: Some("https://lobste.rs/".into()),
            ..request("/missing", 404, "10.0.0.4")
        },
        request("/missing", 404, "10.0.0.4"),
        request("/boom", 500, "10.0.0.5"),
        NewRequest {
            time: Utc::now() - Duration::days(800),
            ..request("/ancient", 200, "10.0.0.9")
        },
    ];
    for request in requests {
        storage.insert(&request).await.unwrap();
    }
    storage
}

fn identifiers(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_summary_table() {
    let storage = seeded().await;
    let modules = Modules::with_defaults(ModuleContext::default());

    let today = storage.query(TimeWindow::today());
    let all = storage.query(TimeWindow::all());
    let queries: [(&str, &dyn RequestQuery); 2] = [("today", today.as_ref()), ("all", all.as_ref())];
    let table = modules.table(&queries).await.unwrap();

    let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Unique Visitors", "Unique Visits", "Hits"]);
    assert_eq!(table.rows[0].counts, vec![5, 6]);
    // The request referred by the site itself is not a unique visit.
    assert_eq!(table.rows[1].counts, vec![6, 7]);
    assert_eq!(table.rows[2].counts, vec![7, 8]);
}

#[tokio::test]
async fn test_graph_over_sampled_days() {
    let storage = seeded().await;
    let modules = Modules::new(identifiers(&["traffic.Hit", "traffic.Error"]), ModuleContext::default());

    let days = sample_days(Utc::now().date_naive(), 30);
    let owned: Vec<_> = days
        .iter()
        .map(|day| (*day, storage.query(TimeWindow::day(*day))))
        .collect();
    let queries: Vec<_> = owned
        .iter()
        .map(|(day, query)| (*day, query.as_ref() as &dyn RequestQuery))
        .collect();

    let series = modules.graph(&queries).await.unwrap();
    assert_eq!(series.len(), 2);
    assert!(series.iter().all(|s| s.data.len() == 16));
    assert_eq!(series[0].data[0].1, 7);
    assert_eq!(series[1].data[0].1, 3);
    assert!(series[0].data[1..].iter().all(|(_, count)| *count == 0));
}

#[tokio::test]
async fn test_overview_plugins() {
    let storage = seeded().await;
    let modules = Modules::with_defaults(ModuleContext::default());
    let mut ids = hitcount::plugins::default_identifiers();
    ids.push("plugins.ActiveUsers".to_string());
    let plugins = Plugins::new(ids, ModuleContext::default());
    let classifier = Arc::new(Classifier::with_defaults(Arc::new(NoopHostnameResolver)).unwrap());

    let query = storage.query(TimeWindow::this_month());
    let ctx = PluginContext {
        query: query.as_ref(),
        storage: storage.as_ref(),
        modules: &modules,
        classifier: &classifier,
        now: Utc::now(),
    };
    let rendered = plugins.render(&ctx).await.unwrap();

    let names: Vec<&str> = rendered.iter().map(|p| p.verbose_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Traffic Information",
            "Latest Requests",
            "Top Paths",
            "Top Error Paths",
            "Top Referrers",
            "Top Search Phrases",
            "Top Browsers",
            "Active Users",
        ]
    );

    let ranking = |i: usize| match &rendered[i].report {
        PluginReport::Ranking(values) => values.clone(),
        other => panic!("expected a ranking, got {:?}", other),
    };
    let ranked = |value: &str, count: u64| RankedValue {
        value: value.to_string(),
        count,
    };

    match &rendered[0].report {
        PluginReport::Traffic(table) => {
            assert_eq!(table.columns, vec!["today", "this_week", "this_month", "this_year", "all"]);
            assert_eq!(table.rows[2].counts[4], 8);
        }
        other => panic!("expected a traffic table, got {:?}", other),
    }
    match &rendered[1].report {
        PluginReport::Requests(latest) => assert_eq!(latest.len(), 5),
        other => panic!("expected requests, got {:?}", other),
    }

    assert_eq!(ranking(2)[0], ranked("/blog/", 2));
    assert_eq!(ranking(3), vec![ranked("/missing", 2), ranked("/boom", 1)]);
    assert_eq!(
        ranking(4),
        vec![
            ranked("https://www.google.com/search?q=traffic+reports", 2),
            ranked("https://lobste.rs/", 1),
            ranked("https://search.yahoo.com/search?p=hitcount", 1),
        ]
    );
    assert_eq!(
        ranking(5),
        vec![ranked("traffic reports", 2), ranked("hitcount", 1)]
    );
    assert_eq!(ranking(6), vec![ranked("Firefox", 3), ranked("Google Chrome", 1)]);

    match &rendered[7].report {
        PluginReport::Users(users) => assert_eq!(users, &vec![42]),
        other => panic!("expected users, got {:?}", other),
    }
}

#[tokio::test]
async fn test_misconfigured_plugins_fail_closed() {
    let storage = seeded().await;
    let modules = Modules::with_defaults(ModuleContext::default());
    let plugins = Plugins::new(identifiers(&["plugins.TopPaths", "TopBrowsers"]), ModuleContext::default());
    let classifier = Arc::new(Classifier::with_defaults(Arc::new(NoopHostnameResolver)).unwrap());

    let query = storage.query(TimeWindow::all());
    let ctx = PluginContext {
        query: query.as_ref(),
        storage: storage.as_ref(),
        modules: &modules,
        classifier: &classifier,
        now: Utc::now(),
    };

    assert!(matches!(
        plugins.render(&ctx).await,
        Err(TrafficError::Configuration(ConfigurationError::MalformedIdentifier(id))) if id == "TopBrowsers"
    ));
}
