//! Logic manager: rules.

use futures_util::stream::BoxStream;

use crate::answer::Rule;
use crate::error::{Result, TypeDBError};
use crate::protocol::{LogicPart, LogicRequest, LogicResponse, PartPayload, RequestPayload, ResponsePayload};
use crate::stream::BidiStream;

#[derive(Debug, Clone, Copy)]
pub struct LogicManager<'a> {
    stream: &'a BidiStream,
}

impl<'a> LogicManager<'a> {
    pub(crate) fn new(stream: &'a BidiStream) -> Self {
        Self { stream }
    }

    async fn single(&self, request: LogicRequest) -> Result<LogicResponse> {
        let payload = RequestPayload::Logic(request);
        match self.stream.single(payload, true)?.get().await? {
            ResponsePayload::Logic(response) => Ok(response),
            other => Err(TypeDBError::unexpected_response("logic", other)),
        }
    }

    pub async fn get_rule(&self, label: &str) -> Result<Option<Rule>> {
        let label = label.to_string();
        match self.single(LogicRequest::GetRule { label }).await? {
            LogicResponse::Rule(rule) => Ok(rule),
            other => Err(TypeDBError::unexpected_response("get rule", other)),
        }
    }

    pub async fn put_rule(&self, label: &str, when: &str, then: &str) -> Result<Rule> {
        let request = LogicRequest::PutRule {
            label: label.to_string(),
            when: when.to_string(),
            then: then.to_string(),
        };
        match self.single(request).await? {
            LogicResponse::PutRule(rule) => Ok(rule),
            other => Err(TypeDBError::unexpected_response("put rule", other)),
        }
    }

    /// Every rule in the schema.
    pub fn get_rules(&self) -> Result<BoxStream<'static, Result<Rule>>> {
        let parts = self
            .stream
            .stream(RequestPayload::Logic(LogicRequest::GetRules))?;
        Ok(parts.items(|part| match part {
            PartPayload::Logic(LogicPart::Rules(rules)) => Ok(rules),
            other => Err(TypeDBError::unexpected_response("get rules", other)),
        }))
    }
}
