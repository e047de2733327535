use crate::client::drain_list;
use crate::client::drain_snapshot;
use crate::client::MockRemoteClient;
use crate::errors::ClientError;
use crate::settings::Selector;
use crate::settings::Setting;
use crate::settings::SettingPage;

#[tokio::test]
async fn test_drain_list_follows_continuations() {
    let mut mock = MockRemoteClient::new();
    mock.expect_list_page()
        .withf(|_, continuation| continuation.is_none())
        .returning(|_, _| {
            Ok(SettingPage {
                settings: vec![
                    Setting::new("a", None, "1", "e1"),
                    Setting::new("b", None, "2", "e2"),
                ],
                continuation: Some("2".to_string()),
            })
        });
    mock.expect_list_page()
        .withf(|_, continuation| continuation.as_deref() == Some("2"))
        .returning(|_, _| {
            Ok(SettingPage {
                settings: vec![Setting::new("c", None, "3", "e3")],
                continuation: None,
            })
        });

    let settings = drain_list(&mock, &Selector::default()).await.unwrap();
    assert_eq!(settings.len(), 3);
    assert_eq!(settings[2].key, "c");
}

#[tokio::test]
async fn test_drain_list_propagates_page_errors() {
    let mut mock = MockRemoteClient::new();
    mock.expect_list_page().returning(|_, _| {
        Err(ClientError::Status {
            status: 500,
            message: "boom".to_string(),
        })
    });

    let err = drain_list(&mock, &Selector::default())
        .await
        .expect_err("listing fails");
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_drain_snapshot_follows_continuations() {
    let mut mock = MockRemoteClient::new();
    mock.expect_list_snapshot_page()
        .withf(|name, continuation| name == "release-1" && continuation.is_none())
        .returning(|_, _| {
            Ok(SettingPage {
                settings: vec![Setting::new("s1", None, "v1", "e1")],
                continuation: Some("1".to_string()),
            })
        });
    mock.expect_list_snapshot_page()
        .withf(|_, continuation| continuation.as_deref() == Some("1"))
        .returning(|_, _| {
            Ok(SettingPage {
                settings: vec![Setting::new("s2", None, "v2", "e2")],
                continuation: None,
            })
        });

    let settings = drain_snapshot(&mock, "release-1").await.unwrap();
    assert_eq!(settings.len(), 2);
    assert_eq!(settings[1].key, "s2");
}
