//! Defines the application state and the face pipeline run for each
//! upload event.

use crate::client::{sdk_config, Clients};
use crate::conf::Settings;
use crate::detect::{Detector, Matcher, RekognitionDetector, RekognitionMatcher};
use crate::event::UploadEvent;
use crate::model::{MatchResult, MatchStatus, MetadataRecord};
use crate::notify::{self, Notifier, SnsNotifier};
use crate::outcome::{Outcome, PipelineError, Response, Stage, StageExt};
use crate::store::{DynamoStore, Store};
use anyhow::{anyhow, Result};
use aws_lambda_events::event::s3::S3Event;
use chrono::{DateTime, Utc};
use envy::from_env;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{error, info, instrument, warn};

/// The external capabilities the pipeline delegates to.
pub struct Services {
    pub detector: Box<dyn Detector>,
    pub matcher: Box<dyn Matcher>,
    pub store: Box<dyn Store>,
    pub notifier: Box<dyn Notifier>,
}

impl Services {
    /// The AWS-backed capabilities, configured from the settings.
    pub fn aws(clients: Clients, settings: &Settings) -> Self {
        Services {
            detector: Box::new(RekognitionDetector::new(clients.rekognition.clone())),
            matcher: Box::new(RekognitionMatcher::new(
                clients.rekognition,
                settings.rekognition_collection(),
            )),
            store: Box::new(DynamoStore::new(clients.dynamodb, settings.dynamo_table())),
            notifier: Box::new(SnsNotifier::new(clients.sns, settings.sns_topic_arn())),
        }
    }
}

/// An App is an initialized application state, derived from
/// settings and the services it talks to.
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The regex that matches S3 event keys.
    pub match_key_re: Regex,

    services: Services,

    /// Source of the processing timestamps.
    clock: fn() -> DateTime<Utc>,
}

impl App {
    /// Initialize an App instance given a settings struct and the
    /// services. Consumes both.
    pub fn new(settings: Settings, services: Services) -> Result<Self> {
        let match_key_re = if let Some(match_key) = &settings.match_key {
            Regex::new(&format!(
                "^{}$",
                match_key
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<String>>()
                    .join("[^/]*?")
            ))
        } else {
            Regex::new("")
        }?;
        Ok(App {
            settings,
            match_key_re,
            services,
            clock: Utc::now,
        })
    }

    /// Replace the clock used to timestamp records.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle an S3 event. Only its first record is processed.
    /// Every failure is reported through the notifier and turned into
    /// an error response.
    #[instrument(skip(self, event))]
    pub async fn handle_event(&self, event: &S3Event) -> Response {
        match UploadEvent::from_s3_event(event).at(Stage::Extract) {
            Ok(upload) => self.handle(&upload).await,
            Err(e) => {
                let (bucket, key) = UploadEvent::best_known(event);
                self.report_failure(&bucket, &key, e).await
            }
        }
    }

    /// Handle an S3 event delivered as the body of a queue message.
    /// Returns whether the message is done with: it was handled, or it
    /// can never be handled and redelivering it would only repeat the
    /// error notification.
    #[instrument(skip(self, body))]
    pub async fn handle_message_body(&self, body: &str) -> bool {
        let event = match serde_json::from_str::<S3Event>(body) {
            Ok(event) => event,
            Err(e) => {
                warn!("Couldn't parse the body of SQS message: {:?}", e);
                return true;
            }
        };
        let extractable = UploadEvent::from_s3_event(&event).is_ok();
        let response = self.handle_event(&event).await;
        if !extractable {
            warn!("SQS message doesn't name an uploaded object; it won't be retried");
        }
        response.is_success() || !extractable
    }

    /// Handle a single upload.
    #[instrument(skip(self))]
    pub async fn handle(&self, event: &UploadEvent) -> Response {
        info!("Processing image");
        match self.run(event).await {
            Ok(outcome) => {
                let response = Response::from(&outcome);
                info!("{}", response.body);
                response
            }
            Err(e) => self.report_failure(&event.bucket, &event.key, e).await,
        }
    }

    /// Run the pipeline stages in order: detect, match, store,
    /// notify.
    async fn run(&self, event: &UploadEvent) -> Result<Outcome, PipelineError> {
        if !self.match_key_re.is_match(&event.key) {
            info!("Key doesn't match the configured filter");
            return Ok(Outcome::Skipped);
        }

        let faces = self
            .services
            .detector
            .detect_faces(event)
            .await
            .at(Stage::Detect)?;
        if faces.len() > 1 {
            warn!(
                "{} faces detected; only the first one is processed",
                faces.len()
            );
        }
        let Some(face) = faces.into_iter().next() else {
            self.services
                .notifier
                .publish(&notify::no_face(event))
                .await
                .at(Stage::Notify)?;
            return Ok(Outcome::NoFace);
        };

        let candidates = self
            .services
            .matcher
            .search_faces(event)
            .await
            .at(Stage::Match)?;
        let result = MatchResult::from_candidates(candidates);
        info!(matched = result.matched, employee = %result.employee_id, "Match result");

        let record = MetadataRecord::new(event, face, result, (self.clock)());
        self.services
            .store
            .put_record(&record)
            .await
            .at(Stage::Store)?;

        let message = match record.match_status {
            MatchStatus::Matched => notify::authorized(&record),
            MatchStatus::Unmatched => {
                notify::unauthorized(&record, self.services.matcher.collection())
            }
        };
        self.services
            .notifier
            .publish(&message)
            .await
            .at(Stage::Notify)?;
        Ok(Outcome::Processed(record))
    }

    /// Log a failure, try to notify about it, and build the error
    /// response. A failure to notify is only logged.
    async fn report_failure(&self, bucket: &str, key: &str, e: PipelineError) -> Response {
        let message = format!("{:#}", e.error);
        error!(stage = %e.stage, bucket, key, "Failed to process image: {}", message);
        if let Err(notify_error) = self
            .services
            .notifier
            .publish(&notify::failure(bucket, key, &message))
            .await
        {
            error!("Couldn't send the error notification: {:#}", notify_error);
        }
        Response::error(format!("Error: {}", message))
    }
}

/// Global App instance.
static CURRENT: OnceCell<App> = OnceCell::new();

/// Initialize the global App instance, connected to AWS.
pub async fn init() -> Result<()> {
    let settings: Settings = from_env()?;
    settings.warn_fallbacks();
    let clients = Clients::new(&sdk_config().await);
    let services = Services::aws(clients, &settings);
    let app = App::new(settings, services)?;
    CURRENT
        .set(app)
        .map_err(|_| anyhow!("app::CURRENT was already initialized"))
}

/// Get the current App instance, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static App {
    CURRENT.get().expect("app is not initialized")
}
