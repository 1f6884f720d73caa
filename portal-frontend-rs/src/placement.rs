//! Placement prep: uploaded PDFs (each with a document in `resources` pointing at its public URL), plus the tips and
//! FAQs shown next to them.

use std::rc::Rc;

use beacon::data_model::{Document, Query};
use beacon::{DocumentStore, ObjectRef, ObjectStore, ObjectStoreError, StoreError};
use serde_json::json;

use crate::access::{AccessError, ValidationError, require_admin, require_text};
use crate::config::{FAQS, RESOURCE_FOLDER, RESOURCES, TIPS};
use crate::state::PortalContext;

#[derive(Clone, Debug, Default, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDraft {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub link: String,
}

#[derive(Clone, Debug, Default, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(default)]
pub struct TipDraft {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi)]
pub struct Tip {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(default)]
pub struct FaqDraft {
    pub question: String,
    pub answer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi)]
pub struct Faq {
    #[serde(default)]
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// A record listed straight out of its collection, with the document id filled in.
trait Listed: serde::de::DeserializeOwned {
    fn with_id(self, id: String) -> Self;
}

impl Listed for Resource {
    fn with_id(self, id: String) -> Self {
        Self { id, ..self }
    }
}

impl Listed for Tip {
    fn with_id(self, id: String) -> Self {
        Self { id, ..self }
    }
}

impl Listed for Faq {
    fn with_id(self, id: String) -> Self {
        Self { id, ..self }
    }
}

fn from_document<T: Listed>(document: &Document) -> Result<T, serde_json::Error> {
    Ok(document.decode::<T>()?.with_id(document.id.clone()))
}

impl TipDraft {
    fn to_tip(&self) -> Result<Tip, ValidationError> {
        Ok(Tip {
            id: String::new(),
            title: require_text("Title", &self.title)?.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

impl FaqDraft {
    fn to_faq(&self) -> Result<Faq, ValidationError> {
        Ok(Faq {
            id: String::new(),
            question: require_text("Question", &self.question)?.to_string(),
            answer: require_text("Answer", &self.answer)?.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Upload failed: {0}")]
    Objects(#[from] ObjectStoreError),
}

/// Last path segment, so a browser-supplied name can't climb out of the folder.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
}

pub struct PlacementDesk {
    store: Rc<dyn DocumentStore>,
    objects: Rc<dyn ObjectStore>,
    context: PortalContext,
}

impl PlacementDesk {
    pub fn new(store: Rc<dyn DocumentStore>, objects: Rc<dyn ObjectStore>, context: PortalContext) -> Self {
        Self {
            store,
            objects,
            context,
        }
    }

    fn check_admin(&self) -> Result<(), AccessError> {
        let identity = self.context.identity();
        require_admin(identity.as_ref()).map(|_| ())
    }

    async fn list<T: Listed>(&self, collection: &str) -> Result<Vec<T>, ResourceError> {
        let snapshot = self.store.query(Query::collection(collection)).await?;
        Ok(snapshot
            .iter()
            .filter_map(|document| {
                from_document(document)
                    .inspect_err(|e| log::warn!("Skipping malformed {collection}/{}: {e}", document.id))
                    .ok()
            })
            .collect())
    }

    pub async fn resources(&self) -> Result<Vec<Resource>, ResourceError> {
        self.list(RESOURCES).await
    }

    pub async fn tips(&self) -> Result<Vec<Tip>, ResourceError> {
        self.list(TIPS).await
    }

    pub async fn add_tip(&self, draft: &TipDraft) -> Result<Tip, ResourceError> {
        self.check_admin()?;
        let mut tip = draft.to_tip()?;
        let data = json!({"title": tip.title, "description": tip.description});
        tip.id = self.store.add(TIPS, None, data).await?;
        Ok(tip)
    }

    pub async fn update_tip(&self, id: &str, draft: &TipDraft) -> Result<Tip, ResourceError> {
        self.check_admin()?;
        let tip = draft.to_tip()?.with_id(id.to_string());
        let data = json!({"title": tip.title, "description": tip.description});
        self.store.update(TIPS, id, data).await?;
        Ok(tip)
    }

    pub async fn delete_tip(&self, id: &str) -> Result<(), ResourceError> {
        self.check_admin()?;
        self.store.delete(TIPS, id).await?;
        Ok(())
    }

    pub async fn faqs(&self) -> Result<Vec<Faq>, ResourceError> {
        self.list(FAQS).await
    }

    pub async fn add_faq(&self, draft: &FaqDraft) -> Result<Faq, ResourceError> {
        self.check_admin()?;
        let mut faq = draft.to_faq()?;
        let data = json!({"question": faq.question, "answer": faq.answer});
        faq.id = self.store.add(FAQS, None, data).await?;
        Ok(faq)
    }

    pub async fn update_faq(&self, id: &str, draft: &FaqDraft) -> Result<Faq, ResourceError> {
        self.check_admin()?;
        let faq = draft.to_faq()?.with_id(id.to_string());
        let data = json!({"question": faq.question, "answer": faq.answer});
        self.store.update(FAQS, id, data).await?;
        Ok(faq)
    }

    pub async fn delete_faq(&self, id: &str) -> Result<(), ResourceError> {
        self.check_admin()?;
        self.store.delete(FAQS, id).await?;
        Ok(())
    }

    /// Uploads the file, then records it. Nothing is recorded if the upload fails.
    pub async fn add_resource(&self, draft: &ResourceDraft, bytes: Vec<u8>) -> Result<Resource, ResourceError> {
        self.check_admin()?;
        let title = require_text("Title", &draft.title)?;
        let file_name = require_text("File", base_name(&draft.file_name))?;
        if bytes.is_empty() {
            return Err(ValidationError::Required("File").into());
        }

        let path = format!("{RESOURCE_FOLDER}/{file_name}");
        let object = self.objects.upload(&path, bytes).await?;
        let link = self.objects.public_url(&object).await?;

        let mut resource = Resource {
            id: String::new(),
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            kind: draft.kind.trim().to_string(),
            link,
        };
        let data = json!({
            "title": resource.title,
            "description": resource.description,
            "type": resource.kind,
            "link": resource.link,
        });
        resource.id = self.store.add(RESOURCES, None, data).await?;
        log::info!("Added resource {} at {path}", resource.id);
        Ok(resource)
    }

    /// Removes the record first, so a failed object delete leaves an orphaned file rather than a dead link.
    pub async fn delete_resource(&self, id: &str, link: &str) -> Result<(), ResourceError> {
        self.check_admin()?;
        self.store.delete(RESOURCES, id).await?;
        self.objects.delete(&ObjectRef(link.to_string())).await?;
        log::info!("Deleted resource {id}");
        Ok(())
    }
}
