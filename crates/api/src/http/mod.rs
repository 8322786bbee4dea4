use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use lms_core::model::{
    AnswerMap, AuthoredQuiz, CourseId, CourseSession, LessonId, Quiz, QuizId, QuizResult,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::client::{ApiError, CompletionAck, CourseApi, QuizApi};

mod wire;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub connect_timeout: Duration,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Reads `LMS_API_URL` and `LMS_API_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("LMS_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let token = env::var("LMS_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(base_url, token)
    }
}

/// REST client for the learning backend.
///
/// A 401 from any endpoint drops the stored bearer token; later calls go out
/// unauthenticated until [`HttpApi::set_token`] is called again.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the underlying client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: Arc::new(RwLock::new(config.token)),
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.read().is_ok_and(|t| t.is_some())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let builder = self.client.request(method, url);
        match self.token.read().ok().and_then(|t| (*t).clone()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("unauthorized response, clearing session token");
            self.set_token(None);
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: wire::error_message(&body),
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.check(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CourseApi for HttpApi {
    async fn fetch_course_session(&self, course_id: CourseId) -> Result<CourseSession, ApiError> {
        let dto: wire::CourseSessionDto = self
            .send(self.request(Method::GET, &format!("/student/course/{course_id}")))
            .await?;
        dto.into_session()
    }

    async fn complete_lesson(
        &self,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<CompletionAck, ApiError> {
        let path = format!("/student/course/{course_id}/lesson/{lesson_id}/complete");
        let dto: wire::CompletionDto = self.send(self.request(Method::POST, &path)).await?;
        dto.into_ack()
    }

    async fn report_heartbeat(&self, course_id: CourseId, seconds: u64) -> Result<(), ApiError> {
        let path = format!("/student/course/{course_id}/track-time");
        let builder = self
            .request(Method::POST, &path)
            .json(&wire::HeartbeatBody { seconds });
        self.check(builder.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl QuizApi for HttpApi {
    async fn fetch_quiz(&self, lesson_id: LessonId) -> Result<Option<Quiz>, ApiError> {
        let builder = self.request(Method::GET, &format!("/quizzes/lesson/{lesson_id}"));
        match self.send::<wire::QuizDto>(builder).await {
            Ok(dto) => dto.into_quiz(lesson_id).map(Some),
            Err(ApiError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn submit_quiz(
        &self,
        quiz_id: QuizId,
        answers: &AnswerMap,
    ) -> Result<QuizResult, ApiError> {
        let builder = self
            .request(Method::POST, &format!("/quizzes/{quiz_id}/submit"))
            .json(answers);
        let dto: wire::SubmissionDto = self.send(builder).await?;
        dto.into_result()
    }

    async fn save_quiz(&self, lesson_id: LessonId, quiz: &AuthoredQuiz) -> Result<Quiz, ApiError> {
        let builder = self
            .request(Method::POST, &format!("/quizzes/lesson/{lesson_id}"))
            .json(quiz);
        let dto: wire::QuizDto = self.send(builder).await?;
        dto.into_quiz(lesson_id)
    }
}
