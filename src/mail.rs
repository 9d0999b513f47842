//! Send emails to user for important updates.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::token::Token;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

/// Data handed to a template.
pub type Payload = Map<String, Value>;

/// Mail templates list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Welcome message carrying the activation token.
    UserWelcome,
}

/// Outbound mail port.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, template: Template, payload: Payload) -> Result<()>;
}

/// Activation mail content: the token plaintext and its owner.
pub fn activation_payload(token: &Token) -> Payload {
    let mut payload = Payload::new();
    payload.insert("activationToken".into(), token.plaintext.clone().into());
    payload.insert("userID".into(), token.user_id.into());
    payload
}

/// Send a mail on a background task.
///
/// Failures are logged and never reach the caller.
pub fn dispatch(
    mailer: Arc<dyn Mailer>,
    to: String,
    template: Template,
    payload: Payload,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = mailer.send(&to, template, payload).await {
            tracing::error!(error = %err, ?template, "mail not sent");
        }
    })
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    to: &'a str,
    template: Template,
    #[serde(flatten)]
    payload: Payload,
}

/// RabbitMQ publisher.
///
/// Without a connection, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    queue: String,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme()).map_err(|_| ServerError::InvalidScheme)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let conn_config = ConnectionProperties::default()
            .with_connection_name("coursekeeper_mail_client".into());
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(conn: Arc<Connection>, queue: &str) -> Result<Channel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content<'_>) -> Cloudevent<'_> {
        let id = Alphanumeric.sample_string(&mut OsRng, ID_LENGTH);
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.coursekeeper.email",
            source: "com.coursekeeper.identity",
            id,
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

#[async_trait]
impl Mailer for MailManager {
    async fn send(&self, to: &str, template: Template, payload: Payload) -> Result<()> {
        let Some(conn) = &self.conn else {
            tracing::debug!(?template, "no mail broker, event dropped");
            return Ok(());
        };
        let channel = Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let event = Self::create_event(Content {
            to,
            template,
            payload,
        });
        let event = serde_json::to_string(&event)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                event.as_bytes(),
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(?template, "event sent");
        Ok(())
    }
}

/// Mailer keeping every message in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<(String, Template, Payload)>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: std::sync::atomic::AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Template, Payload)> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages were sent.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, Template, Payload)> {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("mail never sent")
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, template: Template, payload: Payload) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServerError::InvalidScheme);
        }
        self.sent.lock().unwrap().push((to.to_owned(), template, payload));
        Ok(())
    }
}
