use crate::common::{test_config, tx_ref};
use serde_json::json;
use turnledger::services::{
    chain_client::{ChainError, ChainReceipt},
    ChainClient, JsonRpcChainClient,
};
use wiremock::{
    matchers::{body_partial_json, method},
    Mock, MockServer, ResponseTemplate,
};

async fn client_for(server: &MockServer) -> JsonRpcChainClient {
    let mut config = test_config().blockchain;
    config.rpc_url = server.uri();
    config.request_timeout_ms = 500;
    JsonRpcChainClient::new(&config).unwrap()
}

async fn answer(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result,
            })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reads_block_transaction_and_receipt() {
    let server = MockServer::start().await;
    let hash = tx_ref(9);

    answer(&server, "eth_blockNumber", json!("0x6e")).await;
    answer(
        &server,
        "eth_getTransactionByHash",
        json!({
            "hash": hash,
            "from": "0x00000000000000000000000000000000000000BB",
            "to": "0x00000000000000000000000000000000000000AA",
            "value": "0x5af3107a40000",
            "blockNumber": "0x64",
        }),
    )
    .await;
    answer(
        &server,
        "eth_getTransactionReceipt",
        json!({ "status": "0x1", "blockNumber": "0x64" }),
    )
    .await;

    let client = client_for(&server).await;

    assert_eq!(client.block_number().await.unwrap(), 110);

    let tx = client.transaction(&hash).await.unwrap().unwrap();
    assert_eq!(tx.from, "0x00000000000000000000000000000000000000bb");
    assert_eq!(
        tx.to.as_deref(),
        Some("0x00000000000000000000000000000000000000aa")
    );
    assert_eq!(tx.value_wei, 1_600_000_000_000_000);
    assert_eq!(tx.block_number, Some(100));

    assert_eq!(
        client.receipt(&hash).await.unwrap(),
        Some(ChainReceipt {
            succeeded: true,
            block_number: 100,
        })
    );
}

#[tokio::test]
async fn test_unknown_transaction_and_pending_receipt_are_none() {
    let server = MockServer::start().await;
    answer(&server, "eth_getTransactionByHash", json!(null)).await;
    answer(&server, "eth_getTransactionReceipt", json!(null)).await;

    let client = client_for(&server).await;

    assert_eq!(client.transaction(&tx_ref(1)).await.unwrap(), None);
    assert_eq!(client.receipt(&tx_ref(1)).await.unwrap(), None);
}

#[tokio::test]
async fn test_reverted_receipt_is_not_successful() {
    let server = MockServer::start().await;
    answer(
        &server,
        "eth_getTransactionReceipt",
        json!({ "status": "0x0", "blockNumber": "0x10" }),
    )
    .await;

    let client = client_for(&server).await;

    let receipt = client.receipt(&tx_ref(2)).await.unwrap().unwrap();
    assert!(!receipt.succeeded);
}

#[tokio::test]
async fn test_node_errors_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "rate limited" },
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionByHash" })))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    assert_eq!(
        client.block_number().await,
        Err(ChainError::Rpc {
            code: -32005,
            message: "rate limited".to_string(),
        })
    );
    assert!(matches!(
        client.transaction(&tx_ref(3)).await,
        Err(ChainError::Transport(_))
    ));
}

#[tokio::test]
async fn test_slow_node_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    assert_eq!(client.block_number().await, Err(ChainError::Timeout));
}
