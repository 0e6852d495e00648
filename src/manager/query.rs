//! Query manager.
//!
//! Schema writes and `delete` are single calls; every query that yields
//! answers is a streamed call whose parts are flattened into a
//! [`BoxStream`] of answers.

use futures_util::stream::BoxStream;

use crate::answer::{ConceptMap, ConceptMapGroup, Numeric, NumericGroup};
use crate::connection::Options;
use crate::error::{Result, TypeDBError};
use crate::protocol::{PartPayload, QueryPart, QueryRequest, QueryResponse, RequestPayload, ResponsePayload};
use crate::stream::BidiStream;

/// Query operations of one transaction.
#[derive(Debug, Clone)]
pub struct QueryManager<'a> {
    stream: &'a BidiStream,
    options: Options,
}

impl<'a> QueryManager<'a> {
    pub(crate) fn new(stream: &'a BidiStream) -> Self {
        Self {
            stream,
            options: Options::default(),
        }
    }

    /// Send `options` with every query issued through this manager.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    fn payload(&self, query: QueryRequest) -> RequestPayload {
        RequestPayload::Query {
            query,
            options: self.options.clone(),
        }
    }

    async fn single(&self, query: QueryRequest) -> Result<QueryResponse> {
        match self.stream.single(self.payload(query), true)?.get().await? {
            ResponsePayload::Query(response) => Ok(response),
            other => Err(TypeDBError::unexpected_response("query", other)),
        }
    }

    pub async fn define(&self, query: &str) -> Result<()> {
        match self.single(QueryRequest::Define(query.to_string())).await? {
            QueryResponse::Defined => Ok(()),
            other => Err(TypeDBError::unexpected_response("define", other)),
        }
    }

    pub async fn undefine(&self, query: &str) -> Result<()> {
        match self.single(QueryRequest::Undefine(query.to_string())).await? {
            QueryResponse::Undefined => Ok(()),
            other => Err(TypeDBError::unexpected_response("undefine", other)),
        }
    }

    pub async fn delete(&self, query: &str) -> Result<()> {
        match self.single(QueryRequest::Delete(query.to_string())).await? {
            QueryResponse::Deleted => Ok(()),
            other => Err(TypeDBError::unexpected_response("delete", other)),
        }
    }

    pub async fn match_aggregate(&self, query: &str) -> Result<Numeric> {
        match self.single(QueryRequest::MatchAggregate(query.to_string())).await? {
            QueryResponse::MatchAggregate(numeric) => Ok(numeric),
            other => Err(TypeDBError::unexpected_response("match aggregate", other)),
        }
    }

    pub fn match_(&self, query: &str) -> Result<BoxStream<'static, Result<ConceptMap>>> {
        let parts = self
            .stream
            .stream(self.payload(QueryRequest::Match(query.to_string())))?;
        Ok(parts.items(|part| match part {
            PartPayload::Query(QueryPart::Match(answers)) => Ok(answers),
            other => Err(TypeDBError::unexpected_response("match", other)),
        }))
    }

    pub fn insert(&self, query: &str) -> Result<BoxStream<'static, Result<ConceptMap>>> {
        let parts = self
            .stream
            .stream(self.payload(QueryRequest::Insert(query.to_string())))?;
        Ok(parts.items(|part| match part {
            PartPayload::Query(QueryPart::Insert(answers)) => Ok(answers),
            other => Err(TypeDBError::unexpected_response("insert", other)),
        }))
    }

    pub fn update(&self, query: &str) -> Result<BoxStream<'static, Result<ConceptMap>>> {
        let parts = self
            .stream
            .stream(self.payload(QueryRequest::Update(query.to_string())))?;
        Ok(parts.items(|part| match part {
            PartPayload::Query(QueryPart::Update(answers)) => Ok(answers),
            other => Err(TypeDBError::unexpected_response("update", other)),
        }))
    }

    pub fn match_group(&self, query: &str) -> Result<BoxStream<'static, Result<ConceptMapGroup>>> {
        let parts = self
            .stream
            .stream(self.payload(QueryRequest::MatchGroup(query.to_string())))?;
        Ok(parts.items(|part| match part {
            PartPayload::Query(QueryPart::MatchGroup(groups)) => Ok(groups),
            other => Err(TypeDBError::unexpected_response("match group", other)),
        }))
    }

    pub fn match_group_aggregate(
        &self,
        query: &str,
    ) -> Result<BoxStream<'static, Result<NumericGroup>>> {
        let parts = self
            .stream
            .stream(self.payload(QueryRequest::MatchGroupAggregate(query.to_string())))?;
        Ok(parts.items(|part| match part {
            PartPayload::Query(QueryPart::MatchGroupAggregate(groups)) => Ok(groups),
            other => Err(TypeDBError::unexpected_response("match group aggregate", other)),
        }))
    }
}
