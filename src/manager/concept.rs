//! Concept manager: look up and create schema types, look up things by IID.
//!
//! The typed getters (`get_entity_type`, `get_attribute`, ...) fail with
//! [`TypeDBError::InvalidConceptCast`] when the label or IID names a concept
//! of another kind.

use crate::concept::{Concept, Iid, ValueType};
use crate::error::{Result, TypeDBError};
use crate::protocol::{ConceptManagerRequest, ConceptManagerResponse, RequestPayload, ResponsePayload};
use crate::stream::BidiStream;

#[derive(Debug, Clone, Copy)]
pub struct ConceptManager<'a> {
    stream: &'a BidiStream,
}

impl<'a> ConceptManager<'a> {
    pub(crate) fn new(stream: &'a BidiStream) -> Self {
        Self { stream }
    }

    async fn single(&self, request: ConceptManagerRequest) -> Result<ConceptManagerResponse> {
        let payload = RequestPayload::ConceptManager(request);
        match self.stream.single(payload, true)?.get().await? {
            ResponsePayload::ConceptManager(response) => Ok(response),
            other => Err(TypeDBError::unexpected_response("concept manager", other)),
        }
    }

    pub async fn get_thing_type(&self, label: &str) -> Result<Option<Concept>> {
        let label = label.to_string();
        match self.single(ConceptManagerRequest::GetThingType { label }).await? {
            ConceptManagerResponse::ThingType(concept) => Ok(concept),
            other => Err(TypeDBError::unexpected_response("get thing type", other)),
        }
    }

    pub async fn get_entity_type(&self, label: &str) -> Result<Option<Concept>> {
        checked(self.get_thing_type(label).await?, Concept::as_entity_type)
    }

    pub async fn get_relation_type(&self, label: &str) -> Result<Option<Concept>> {
        checked(self.get_thing_type(label).await?, Concept::as_relation_type)
    }

    pub async fn get_attribute_type(&self, label: &str) -> Result<Option<Concept>> {
        checked(self.get_thing_type(label).await?, Concept::as_attribute_type)
    }

    pub async fn put_entity_type(&self, label: &str) -> Result<Concept> {
        let label = label.to_string();
        self.put(ConceptManagerRequest::PutEntityType { label }).await
    }

    pub async fn put_relation_type(&self, label: &str) -> Result<Concept> {
        let label = label.to_string();
        self.put(ConceptManagerRequest::PutRelationType { label }).await
    }

    pub async fn put_attribute_type(&self, label: &str, value_type: ValueType) -> Result<Concept> {
        let label = label.to_string();
        self.put(ConceptManagerRequest::PutAttributeType { label, value_type })
            .await
    }

    async fn put(&self, request: ConceptManagerRequest) -> Result<Concept> {
        match self.single(request).await? {
            ConceptManagerResponse::PutType(concept) => Ok(concept),
            other => Err(TypeDBError::unexpected_response("put type", other)),
        }
    }

    pub async fn get_thing(&self, iid: &Iid) -> Result<Option<Concept>> {
        let iid = iid.clone();
        match self.single(ConceptManagerRequest::GetThing { iid }).await? {
            ConceptManagerResponse::Thing(concept) => Ok(concept),
            other => Err(TypeDBError::unexpected_response("get thing", other)),
        }
    }

    pub async fn get_entity(&self, iid: &Iid) -> Result<Option<Concept>> {
        checked(self.get_thing(iid).await?, Concept::as_entity)
    }

    pub async fn get_relation(&self, iid: &Iid) -> Result<Option<Concept>> {
        checked(self.get_thing(iid).await?, Concept::as_relation)
    }

    pub async fn get_attribute(&self, iid: &Iid) -> Result<Option<Concept>> {
        checked(self.get_thing(iid).await?, Concept::as_attribute)
    }
}

/// Pass `concept` through if `cast` accepts it.
fn checked<T>(
    concept: Option<Concept>,
    cast: fn(&Concept) -> Result<&T>,
) -> Result<Option<Concept>> {
    match concept {
        Some(concept) => {
            cast(&concept)?;
            Ok(Some(concept))
        }
        None => Ok(None),
    }
}
