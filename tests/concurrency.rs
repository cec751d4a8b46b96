//! Many sessions rendering at once

use std::sync::Arc;
use std::time::Duration;

use folio_server::document::{
    DocumentError, DocumentRegistry, PageRequest, RegistryOptions, TileRequest,
};
use folio_server::engine::synthetic::{page_color, synthetic_pdf, SyntheticEngine};
use folio_server::render::{RenderDispatcher, RenderOptions, WorkerPool};

const SESSIONS: usize = 5;
const RENDERS_PER_SESSION: usize = 10;

fn setup(engine: SyntheticEngine, workers: usize) -> RenderDispatcher {
    let registry = DocumentRegistry::new(
        Arc::new(engine),
        WorkerPool::new(workers),
        RegistryOptions::default(),
    );
    RenderDispatcher::new(registry, RenderOptions::default())
}

fn session(i: usize) -> String {
    format!("session-{}", i)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_fifty_renders_across_five_sessions() {
    let engine = SyntheticEngine::new().with_raster_delay(Duration::from_millis(2));
    let probe = engine.probe();
    let dispatcher = setup(engine, 4);

    for i in 0..SESSIONS {
        let id = session(i);
        let pages = vec![(200.0, 300.0); 4];
        dispatcher
            .registry()
            .open(&id, synthetic_pdf(&id, &pages, None), None)
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for n in 0..RENDERS_PER_SESSION {
        for i in 0..SESSIONS {
            let dispatcher = dispatcher.clone();
            let id = session(i);
            let page = n % 4 + 1;
            tasks.push(tokio::spawn(async move {
                let buffer = if n % 2 == 0 {
                    dispatcher
                        .render_page(&id, PageRequest { page, width: 20, height: 30 })
                        .await
                } else {
                    dispatcher
                        .render_tile(
                            &id,
                            TileRequest { page, x: 50.0, y: 50.0, width: 20, height: 30, scale: 0.5 },
                        )
                        .await
                };
                (id, page, buffer)
            }));
        }
    }

    let outcome = tokio::time::timeout(Duration::from_secs(30), futures::future::join_all(tasks))
        .await
        .expect("renders deadlocked");

    assert_eq!(outcome.len(), SESSIONS * RENDERS_PER_SESSION);
    for joined in outcome {
        let (id, page, buffer) = joined.unwrap();
        let buffer = buffer.unwrap();
        assert_eq!((buffer.width(), buffer.height()), (20, 30));
        assert_eq!(buffer.data().len(), 20 * 30 * 4);
        // every pixel belongs to this session's page
        assert_eq!(buffer.pixel(0, 0), page_color(&id, page - 1));
        assert_eq!(buffer.pixel(19, 29), page_color(&id, page - 1));
    }

    assert_eq!(probe.overlaps(), 0);
    for i in 0..SESSIONS {
        assert_eq!(probe.pages_rasterized(&session(i)).len(), RENDERS_PER_SESSION);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_render_in_parallel() {
    let engine = SyntheticEngine::new().with_raster_delay(Duration::from_millis(100));
    let dispatcher = setup(engine, 4);

    for i in 0..4 {
        let id = session(i);
        dispatcher
            .registry()
            .open(&id, synthetic_pdf(&id, &[(10.0, 10.0)], None), None)
            .await
            .unwrap();
    }

    let start = std::time::Instant::now();
    let renders = (0..4).map(|i| {
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .render_page(&session(i), PageRequest { page: 1, width: 4, height: 4 })
                .await
        }
    });
    for result in futures::future::join_all(renders).await {
        assert!(result.is_ok());
    }

    // four 100ms renders on four workers finish well under 400ms
    assert!(start.elapsed() < Duration::from_millis(350));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_closing_one_session_leaves_others_untouched() {
    let engine = SyntheticEngine::new().with_raster_delay(Duration::from_millis(5));
    let probe = engine.probe();
    let dispatcher = setup(engine, 2);

    for id in ["keep", "drop"] {
        dispatcher
            .registry()
            .open(id, synthetic_pdf(id, &[(10.0, 10.0); 2], None), None)
            .await
            .unwrap();
    }

    let keep = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let mut results = Vec::new();
            for _ in 0..10 {
                results.push(
                    dispatcher
                        .render_page("keep", PageRequest { page: 2, width: 4, height: 4 })
                        .await,
                );
            }
            results
        })
    };

    assert!(dispatcher.registry().close("drop").await);
    let err = dispatcher
        .render_page("drop", PageRequest { page: 1, width: 4, height: 4 })
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::DocumentNotFound(_)));

    for result in keep.await.unwrap() {
        assert_eq!(result.unwrap().pixel(0, 0), page_color("keep", 1));
    }
    assert_eq!(probe.live_documents(), 1);
}
