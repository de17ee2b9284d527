//! HTTP gateway round-trips against a mock collaborator.

use rust_decimal_macros::dec;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use textbill::catalog::{Catalog, CatalogError, HttpCatalog};
use textbill::inference::{HttpInferenceGateway, InferenceError, InferenceGateway};
use textbill::types::{ModelId, UserId};
use textbill::wallet::{HttpWalletGateway, WalletError, WalletGateway};

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

mod wallet {
    use super::*;

    #[tokio::test]
    async fn balance_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallet/u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": "10.5"
            })))
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let balance = gateway.check_balance(&UserId::from("u1")).await.unwrap();
        assert_eq!(balance, dec!(10.5));
    }

    #[tokio::test]
    async fn debit_posts_signed_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallet/u1/topup"))
            .and(body_json(serde_json::json!({ "amount": "-0.3" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": "9.7"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let new_balance = gateway
            .adjust(&UserId::from("u1"), dec!(-0.3))
            .await
            .unwrap();
        assert_eq!(new_balance, dec!(9.7));
    }

    #[tokio::test]
    async fn user_id_with_reserved_characters_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallet/team%2Fu%201"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": "3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let balance = gateway
            .check_balance(&UserId::from("team/u 1"))
            .await
            .unwrap();
        assert_eq!(balance, dec!(3));
    }

    #[tokio::test]
    async fn missing_wallet_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallet/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let err = gateway
            .check_balance(&UserId::from("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NotFound { .. }));
    }

    #[tokio::test]
    async fn client_error_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallet/u1/topup"))
            .respond_with(ResponseTemplate::new(400).set_body_string("insufficient funds"))
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let err = gateway
            .adjust(&UserId::from("u1"), dec!(-100))
            .await
            .unwrap_err();
        match err {
            WalletError::Rejected { message } => assert!(message.contains("insufficient")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallet/u1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = HttpWalletGateway::new(reqwest::Client::new(), base_url(&server));
        let err = gateway
            .check_balance(&UserId::from("u1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn model_row_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/sentiment-small"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sentiment-small",
                "name": "org/sentiment-small",
                "task": "text-classification",
                "price_per_char": "0.0001"
            })))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(reqwest::Client::new(), base_url(&server));
        let entry = catalog
            .get_model(&ModelId::from("sentiment-small"))
            .await
            .unwrap();
        assert_eq!(entry.name, "org/sentiment-small");
        assert_eq!(entry.price_per_char, dec!(0.0001));
    }

    #[tokio::test]
    async fn model_id_with_slash_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/org%2Fsentiment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "org/sentiment",
                "name": "org/sentiment",
                "task": "sentiment-analysis",
                "price_per_char": "0.01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(reqwest::Client::new(), base_url(&server));
        let entry = catalog
            .get_model(&ModelId::from("org/sentiment"))
            .await
            .unwrap();
        assert_eq!(entry.price_per_char, dec!(0.01));
    }

    #[tokio::test]
    async fn missing_model_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(reqwest::Client::new(), base_url(&server));
        let err = catalog.get_model(&ModelId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn negative_price_rejected_on_the_way_in() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "bad",
                "name": "org/bad",
                "task": "text-classification",
                "price_per_char": "-1"
            })))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(reqwest::Client::new(), base_url(&server));
        let err = catalog.get_model(&ModelId::from("bad")).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPrice { .. }));
    }

    #[tokio::test]
    async fn listing_returns_all_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "m1",
                    "name": "org/m1",
                    "task": "text-classification",
                    "price_per_char": "0.1"
                },
                {
                    "id": "m2",
                    "name": "org/m2",
                    "task": "sentiment-analysis",
                    "price_per_char": "0.02"
                }
            ])))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(reqwest::Client::new(), base_url(&server));
        let rows = catalog.list_models().await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}

mod inference {
    use super::*;

    #[tokio::test]
    async fn predictions_round_trip_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/m1"))
            .and(body_json(serde_json::json!({ "texts": ["a", "bb"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    { "label": "POSITIVE", "score": 0.98 },
                    { "label": "NEGATIVE", "score": 0.73 }
                ]
            })))
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), base_url(&server));
        let preds = gateway
            .predict(&ModelId::from("m1"), &["a".into(), "bb".into()])
            .await
            .unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].label, "POSITIVE");
        assert_eq!(preds[1].label, "NEGATIVE");
    }

    #[tokio::test]
    async fn model_id_with_slash_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/org%2Fsentiment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{ "label": "POSITIVE", "score": 0.9 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), base_url(&server));
        let preds = gateway
            .predict(&ModelId::from("org/sentiment"), &["a".into()])
            .await
            .unwrap();
        assert_eq!(preds[0].label, "POSITIVE");
    }

    #[tokio::test]
    async fn missing_engine_maps_to_model_not_loaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), base_url(&server));
        let err = gateway
            .predict(&ModelId::from("ghost"), &["x".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ModelNotLoaded { .. }));
    }

    #[tokio::test]
    async fn short_prediction_list_is_an_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{ "label": "POSITIVE", "score": 0.9 }]
            })))
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), base_url(&server));
        let err = gateway
            .predict(&ModelId::from("m1"), &["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Engine { .. }));
    }
}
