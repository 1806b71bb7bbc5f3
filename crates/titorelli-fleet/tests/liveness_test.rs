// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for liveness heartbeats and the dead-man's switch.

mod common;

use std::time::Duration;

use common::{LIVENESS, TestFleet, client_id, settle};
use titorelli_fleet::identity;
use titorelli_fleet::store::BotState;

#[tokio::test(start_paused = true)]
async fn test_heartbeat_marks_running() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;
    fleet.service.start(100).await.unwrap();

    assert!(fleet.service.report_alive(&client_id(&bot)).await.unwrap());

    assert_eq!(fleet.state(100).await, BotState::Running);
    let controller = fleet.registry.get(bot.id).unwrap();
    assert!(controller.liveness_armed());
}

#[tokio::test(start_paused = true)]
async fn test_regular_heartbeats_keep_bot_running() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;
    fleet.service.start(100).await.unwrap();

    for _ in 0..10 {
        assert!(fleet.service.report_alive(&client_id(&bot)).await.unwrap());
        tokio::time::sleep(LIVENESS - Duration::from_secs(10)).await;
        assert_eq!(fleet.state(100).await, BotState::Running);
    }
}

#[tokio::test(start_paused = true)]
async fn test_silence_marks_failed() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;
    fleet.service.start(100).await.unwrap();
    fleet.service.report_alive(&client_id(&bot)).await.unwrap();

    tokio::time::sleep(LIVENESS - Duration::from_secs(1)).await;
    assert_eq!(fleet.state(100).await, BotState::Running);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(fleet.state(100).await, BotState::Failed);

    // a late heartbeat revives it
    assert!(fleet.service.report_alive(&client_id(&bot)).await.unwrap());
    assert_eq!(fleet.state(100).await, BotState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_fail_stopped_bot() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;
    fleet.service.report_alive(&client_id(&bot)).await.unwrap();
    fleet.set_state(&bot, BotState::Stopped).await;

    tokio::time::sleep(LIVENESS * 2).await;
    settle().await;

    assert_eq!(fleet.state(100).await, BotState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_identifier_is_ignored() {
    let fleet = TestFleet::new();
    fleet.create_bot(1, 100).await;

    for client_id in ["", "garbage!", "TVE9PQ==", "bm90OmludHM="] {
        assert!(!fleet.service.report_alive(client_id).await.unwrap());
    }
    assert_eq!(fleet.state(100).await, BotState::Created);
    assert!(fleet.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_or_mismatched_identity_is_ignored() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;

    assert!(
        !fleet
            .service
            .report_alive(&identity::encode(bot.id + 1000, 1))
            .await
            .unwrap()
    );
    assert!(
        !fleet
            .service
            .report_alive(&identity::encode(bot.id, 2))
            .await
            .unwrap()
    );
    assert_eq!(fleet.state(100).await, BotState::Created);
}

#[tokio::test(start_paused = true)]
async fn test_delete_cancels_liveness_timer() {
    let fleet = TestFleet::new();
    let bot = fleet.create_bot(1, 100).await;
    fleet.service.report_alive(&client_id(&bot)).await.unwrap();
    let controller = fleet.registry.get(bot.id).unwrap();

    fleet.service.remove(100).await.unwrap();

    assert!(!controller.liveness_armed());
    assert!(!controller.report_alive().await.unwrap());
    assert!(!fleet.service.report_alive(&client_id(&bot)).await.unwrap());
}
