//! End-to-end serving flow against the in-memory store:
//! create → pay → serve → record engagement → pause/resume → analytics → expire.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use campaign_core::config::AppConfig;
    use campaign_core::error::CampaignError;
    use campaign_core::event_bus::{capture_sink, noop_sink};
    use campaign_core::types::{Actor, AdType, CampaignStatus, CreateCampaign};
    use campaign_engine::{AdEngine, PaymentEvent};
    use campaign_lifecycle::LifecycleEvent;
    use campaign_store::{CampaignStore, MemoryStore};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sidebar_request(title: &str, days: i64) -> CreateCampaign {
        let start = Utc::now() - Duration::minutes(5);
        CreateCampaign {
            title: title.to_string(),
            ad_type: AdType::BannerSide,
            position: Some("sidebar".to_string()),
            image_url: format!("https://cdn.example.com/{title}.png"),
            target_link: "https://example.com/landing".to_string(),
            start_date: start,
            end_date: start + Duration::days(days),
            price_override: None,
            owner_id: None,
        }
    }

    #[tokio::test]
    async fn test_full_serving_flow() {
        let store = Arc::new(MemoryStore::new());
        let collector = capture_sink();
        let engine =
            AdEngine::new(&AppConfig::default(), store.clone(), noop_sink(), collector.clone());
        let advertiser = Actor::advertiser(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());

        let a = engine.create(sidebar_request("alpha", 10), &advertiser).await.unwrap();
        let b = engine.create(sidebar_request("beta", 10), &advertiser).await.unwrap();
        assert_eq!(a.price, Decimal::from(300));

        // unpaid campaigns cannot be approved and are never served
        let err = engine.transition(a.id, LifecycleEvent::Approve, &admin).await.unwrap_err();
        assert!(matches!(err, CampaignError::PaymentRequired(_)));
        assert!(engine.serve("SIDEBAR", None, Utc::now()).await.unwrap().is_empty());

        for id in [a.id, b.id] {
            let paid = engine
                .handle_payment(&PaymentEvent { campaign_id: id, transaction_id: None })
                .await
                .unwrap()
                .unwrap();
            assert_eq!(paid.status, CampaignStatus::Active);
        }

        // rotation favours whichever ad has fewer impressions
        let mut served: HashMap<Uuid, u64> = HashMap::new();
        for _ in 0..400 {
            let picked = engine.serve("SIDEBAR", None, Utc::now()).await.unwrap();
            assert_eq!(picked.len(), 1);
            engine.record_impression(picked[0].id).await.unwrap();
            *served.entry(picked[0].id).or_default() += 1;
        }
        let (sa, sb) = (served[&a.id], served[&b.id]);
        assert!(sa.abs_diff(sb) < 80, "unbalanced rotation: {sa} vs {sb}");

        engine.record_click(a.id).await.unwrap();

        // paused campaigns drop out of rotation
        engine.transition(b.id, LifecycleEvent::Pause, &advertiser).await.unwrap();
        for _ in 0..20 {
            let picked = engine.serve("SIDEBAR", None, Utc::now()).await.unwrap();
            assert_eq!(picked[0].id, a.id);
        }
        let resumed = engine
            .transition(b.id, LifecycleEvent::Resume, &advertiser)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.status, CampaignStatus::Active);

        let summary = engine.advertiser_analytics(advertiser.id, &advertiser).await.unwrap();
        assert_eq!(summary.total_ads, 2);
        assert_eq!(summary.total_impressions, 400);
        assert_eq!(summary.total_clicks, 1);
        assert_eq!(summary.average_ctr, 0.25);

        let stranger = Actor::advertiser(Uuid::new_v4());
        assert!(matches!(
            engine.campaign_analytics(a.id, &stranger).await,
            Err(CampaignError::Unauthorized)
        ));

        let expired = engine.expire_overdue(Utc::now() + Duration::days(30)).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(store.get(a.id).await.unwrap().unwrap().status, CampaignStatus::Expired);
        assert!(engine.serve("SIDEBAR", None, Utc::now()).await.unwrap().is_empty());

        // analytics delivery happens in the background
        for _ in 0..100 {
            if collector.count() >= 401 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(collector.count(), 401);
    }

    #[tokio::test]
    async fn test_slider_serves_carousel() {
        let engine = AdEngine::new(
            &AppConfig::default(),
            Arc::new(MemoryStore::new()),
            noop_sink(),
            noop_sink(),
        );
        let advertiser = Actor::advertiser(Uuid::new_v4());
        for i in 0..4 {
            let start = Utc::now() - Duration::minutes(1);
            let c = engine
                .create(
                    CreateCampaign {
                        title: format!("slide {i}"),
                        ad_type: AdType::Slider,
                        position: None,
                        image_url: "https://cdn.example.com/s.png".into(),
                        target_link: "https://example.com/s".into(),
                        start_date: start,
                        end_date: start + Duration::days(3),
                        price_override: None,
                        owner_id: None,
                    },
                    &advertiser,
                )
                .await
                .unwrap();
            engine
                .handle_payment(&PaymentEvent { campaign_id: c.id, transaction_id: None })
                .await
                .unwrap();
        }

        assert_eq!(engine.serve("MID_PAGE", Some(3), Utc::now()).await.unwrap().len(), 3);
        assert_eq!(engine.serve("MID_PAGE", Some(10), Utc::now()).await.unwrap().len(), 4);
    }
}
