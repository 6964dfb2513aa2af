use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use veil_types::{KeySecret, ObjectRef};

use crate::channel::{BufferedReadChannel, ReadChannel, WriteChannel};
use crate::csek::{SealedPayload, ALGORITHM};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    Acl, AclEntity, AclScope, Bucket, BucketInfo, ComposeRequest, CopyRequest, CustomerEncryption,
    HmacKey, HmacKeyMetadata, HmacKeyState, IamPolicy, Object, ObjectField, ObjectInfo, Page,
    ServiceAccount,
};
use crate::options::{
    find_customer_key, preconditions, BucketOption, EncodedKey, GetOption, ListOption,
    Precondition, SignUrlOption, SourceOption, TargetOption, WriteOption,
};
use crate::traits::ObjectStorage;

const URL_BASE: &str = "https://storage.veil.invalid";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

enum Payload {
    Plain(Vec<u8>),
    Sealed(SealedPayload),
}

struct StoredObject {
    object: Object,
    payload: Payload,
}

struct BucketEntry {
    bucket: Bucket,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Default)]
struct StorageState {
    buckets: BTreeMap<String, BucketEntry>,
    last_generation: i64,
}

impl StorageState {
    fn bucket(&self, name: &str) -> StoreResult<&BucketEntry> {
        self.buckets
            .get(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    fn bucket_mut(&mut self, name: &str) -> StoreResult<&mut BucketEntry> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    /// The live object at `id`, honouring a pinned generation.
    fn stored(&self, id: &ObjectRef) -> StoreResult<Option<&StoredObject>> {
        let entry = self.bucket(&id.bucket)?;
        Ok(entry
            .objects
            .get(&id.name)
            .filter(|s| generation_matches(id, &s.object)))
    }

    fn stored_mut(&mut self, id: &ObjectRef) -> StoreResult<Option<&mut StoredObject>> {
        let entry = self.bucket_mut(&id.bucket)?;
        Ok(entry
            .objects
            .get_mut(&id.name)
            .filter(|s| generation_matches(id, &s.object)))
    }

    fn next_generation(&mut self) -> i64 {
        self.last_generation += 1;
        self.last_generation
    }
}

fn generation_matches(id: &ObjectRef, object: &Object) -> bool {
    id.generation.map_or(true, |g| g == object.generation)
}

fn read_state(state: &RwLock<StorageState>) -> StoreResult<RwLockReadGuard<'_, StorageState>> {
    state
        .read()
        .map_err(|_| StoreError::Internal("storage lock poisoned".into()))
}

fn write_state(state: &RwLock<StorageState>) -> StoreResult<RwLockWriteGuard<'_, StorageState>> {
    state
        .write()
        .map_err(|_| StoreError::Internal("storage lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// Shared write/read paths
// ---------------------------------------------------------------------------

fn decode_key(key: Option<&EncodedKey>) -> StoreResult<Option<KeySecret>> {
    key.map(|k| {
        k.decode()
            .map_err(|e| StoreError::InvalidEncryptionKey(e.to_string()))
    })
    .transpose()
}

fn check_preconditions(
    id: &ObjectRef,
    current: Option<&Object>,
    preconditions: &[Precondition],
) -> StoreResult<()> {
    for precondition in preconditions {
        let holds = match (precondition, current) {
            (Precondition::DoesNotExist, current) => current.is_none(),
            (Precondition::GenerationMatch(0), current) => current.is_none(),
            (Precondition::GenerationMatch(g), Some(o)) => o.generation == *g,
            (Precondition::GenerationNotMatch(g), Some(o)) => o.generation != *g,
            (Precondition::GenerationNotMatch(_), None) => true,
            (Precondition::MetagenerationMatch(m), Some(o)) => o.metageneration == *m,
            (_, None) => false,
        };
        if !holds {
            return Err(StoreError::PreconditionFailed(format!(
                "{precondition:?} does not hold for {id}"
            )));
        }
    }
    Ok(())
}

fn check_bucket_preconditions(bucket: &Bucket, options: &[BucketOption]) -> StoreResult<()> {
    for precondition in preconditions(options) {
        if let Precondition::MetagenerationMatch(m) = precondition {
            if bucket.metageneration != m {
                return Err(StoreError::PreconditionFailed(format!(
                    "bucket {} metageneration is {}, expected {m}",
                    bucket.name(),
                    bucket.metageneration
                )));
            }
        }
    }
    Ok(())
}

fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn verify_checksum(content: &[u8], expected: Option<&str>) -> StoreResult<()> {
    if let Some(expected) = expected {
        let actual = sha256_hex(content);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(StoreError::InvalidArgument(format!(
                "checksum mismatch: expected {expected}, got {actual}"
            )));
        }
    }
    Ok(())
}

fn checksum_option(options: &[WriteOption]) -> Option<String> {
    options.iter().find_map(|o| match o {
        WriteOption::ChecksumMatch(sum) => Some(sum.clone()),
        _ => None,
    })
}

/// Store `content` as a new generation of `info.id`.
fn commit(
    state: &RwLock<StorageState>,
    info: ObjectInfo,
    content: &[u8],
    key: Option<&KeySecret>,
    preconditions: &[Precondition],
) -> StoreResult<Object> {
    let payload = match key {
        Some(key) => Payload::Sealed(SealedPayload::seal(key, content)?),
        None => Payload::Plain(content.to_vec()),
    };
    let customer_encryption = match &payload {
        Payload::Sealed(sealed) => Some(CustomerEncryption {
            algorithm: ALGORITHM.to_string(),
            key_sha256: sealed.key_sha256_b64(),
        }),
        Payload::Plain(_) => None,
    };

    let mut state = write_state(state)?;
    {
        let entry = state.bucket(&info.id.bucket)?;
        let current = entry.objects.get(&info.id.name).map(|s| &s.object);
        check_preconditions(&info.id, current, preconditions)?;
    }

    let generation = state.next_generation();
    let now = Utc::now();
    let mut info = info;
    info.id = info.id.latest();
    info.removed_metadata.clear();
    let object = Object {
        info,
        generation,
        metageneration: 1,
        size: content.len() as u64,
        sha256_hex: Some(sha256_hex(content)),
        customer_encryption,
        created: now,
        updated: now,
    };

    let entry = state.bucket_mut(&object.info.id.bucket)?;
    entry.objects.insert(
        object.info.id.name.clone(),
        StoredObject {
            object: object.clone(),
            payload,
        },
    );
    debug!(
        object = %object.id(),
        size = object.size,
        sealed = object.customer_encryption.is_some(),
        "object stored"
    );
    Ok(object)
}

fn open_payload(id: &ObjectRef, stored: &StoredObject, key: Option<&KeySecret>) -> StoreResult<Vec<u8>> {
    match (&stored.payload, key) {
        (Payload::Plain(bytes), None) => Ok(bytes.clone()),
        (Payload::Plain(_), Some(_)) => Err(StoreError::InvalidEncryptionKey(format!(
            "object {id} is not encrypted with a customer-supplied key"
        ))),
        (Payload::Sealed(_), None) => Err(StoreError::EncryptionKeyRequired(id.clone())),
        (Payload::Sealed(sealed), Some(key)) => sealed
            .open(key)?
            .ok_or_else(|| StoreError::EncryptionKeyMismatch(id.clone())),
    }
}

/// Clear the optional fields not named in `fields`.
fn project(mut object: Object, fields: &[ObjectField]) -> Object {
    if !fields.contains(&ObjectField::ContentType) {
        object.info.content_type = None;
    }
    if !fields.contains(&ObjectField::Metadata) {
        object.info.metadata = None;
    }
    if !fields.contains(&ObjectField::Checksum) {
        object.sha256_hex = None;
    }
    if !fields.contains(&ObjectField::CustomerEncryption) {
        object.customer_encryption = None;
    }
    object
}

/// Name-ordered listing with prefix filter and token paging. The page token
/// is the last name returned.
fn paginate<T>(entries: Vec<(String, T)>, options: &[ListOption]) -> Page<T> {
    let mut prefix = None;
    let mut page_size = None;
    let mut token = None;
    for option in options {
        match option {
            ListOption::Prefix(p) => prefix = Some(p.as_str()),
            ListOption::PageSize(n) => page_size = Some(*n),
            ListOption::PageToken(t) => token = Some(t.as_str()),
            ListOption::UserProject(_) => {}
        }
    }
    let limit = page_size.filter(|n| *n > 0).unwrap_or(usize::MAX);

    let mut remaining = entries
        .into_iter()
        .filter(|(name, _)| prefix.map_or(true, |p| name.starts_with(p)))
        .filter(|(name, _)| token.map_or(true, |t| name.as_str() > t))
        .peekable();

    let mut items = Vec::new();
    let mut last = None;
    while items.len() < limit {
        match remaining.next() {
            Some((name, item)) => {
                last = Some(name);
                items.push(item);
            }
            None => break,
        }
    }
    let next_page_token = if remaining.peek().is_some() { last } else { None };
    Page {
        items,
        next_page_token,
    }
}

// ---------------------------------------------------------------------------
// InMemoryStorage
// ---------------------------------------------------------------------------

/// An administrative call received by [`InMemoryStorage`], with its
/// arguments in `Debug` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub arguments: String,
}

/// In-memory object storage.
///
/// Intended for tests and embedding. Buckets, objects, generations and
/// preconditions behave like a remote store, and customer-supplied keys are
/// honoured: payloads written with a key are sealed with AES-256-GCM and
/// only the key's SHA-256 fingerprint is kept. All of that sits behind one
/// `RwLock`, shared with open write channels so that
/// [`WriteChannel::close`] can commit.
///
/// Access control, HMAC keys, retention locks and URL signing are not
/// modelled. Those calls are recorded (see [`Self::recorded_calls`]) and
/// answered from their arguments; nothing they carry is retained.
pub struct InMemoryStorage {
    state: Arc<RwLock<StorageState>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StorageState::default())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The payload bytes as held at rest: ciphertext for sealed objects.
    pub fn stored_payload(&self, id: &ObjectRef) -> StoreResult<Option<Vec<u8>>> {
        let state = read_state(&self.state)?;
        Ok(state.stored(id)?.map(|s| match &s.payload {
            Payload::Plain(bytes) => bytes.clone(),
            Payload::Sealed(sealed) => sealed.ciphertext().to_vec(),
        }))
    }

    /// Number of live objects across all buckets.
    pub fn object_count(&self) -> StoreResult<usize> {
        let state = read_state(&self.state)?;
        Ok(state.buckets.values().map(|b| b.objects.len()).sum())
    }

    /// Administrative calls received so far, oldest first.
    pub fn recorded_calls(&self) -> StoreResult<Vec<RecordedCall>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .map_err(|_| StoreError::Internal("call log lock poisoned".into()))
    }

    fn record(&self, operation: &'static str, arguments: impl fmt::Debug) -> StoreResult<()> {
        let arguments = format!("{arguments:?}");
        debug!(operation, %arguments, "administrative call recorded");
        self.calls
            .lock()
            .map_err(|_| StoreError::Internal("call log lock poisoned".into()))?
            .push(RecordedCall {
                operation,
                arguments,
            });
        Ok(())
    }

    fn read_payload(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Vec<u8>> {
        let key = decode_key(find_customer_key(options))?;
        let state = read_state(&self.state)?;
        let stored = state
            .stored(id)?
            .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))?;
        check_preconditions(id, Some(&stored.object), &preconditions(options))?;
        open_payload(id, stored, key.as_ref())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers an upload and commits it on close.
struct MemoryWriteChannel {
    state: Arc<RwLock<StorageState>>,
    info: ObjectInfo,
    key: Option<KeySecret>,
    preconditions: Vec<Precondition>,
    checksum: Option<String>,
    buffer: Vec<u8>,
}

impl io::Write for MemoryWriteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteChannel for MemoryWriteChannel {
    fn close(self: Box<Self>) -> StoreResult<Object> {
        let this = *self;
        verify_checksum(&this.buffer, this.checksum.as_deref())?;
        commit(
            &this.state,
            this.info,
            &this.buffer,
            this.key.as_ref(),
            &this.preconditions,
        )
    }
}

impl ObjectStorage for InMemoryStorage {
    // ---- Buckets ----

    fn create_bucket(&self, info: BucketInfo, _options: &[BucketOption]) -> StoreResult<Bucket> {
        if info.name.is_empty() {
            return Err(StoreError::InvalidArgument("bucket name is empty".into()));
        }
        let mut state = write_state(&self.state)?;
        if state.buckets.contains_key(&info.name) {
            return Err(StoreError::AlreadyExists(format!("bucket {}", info.name)));
        }
        let bucket = Bucket {
            info,
            metageneration: 1,
            retention_locked: false,
            created: Utc::now(),
        };
        state.buckets.insert(
            bucket.name().to_string(),
            BucketEntry {
                bucket: bucket.clone(),
                objects: BTreeMap::new(),
            },
        );
        info!(bucket = bucket.name(), "bucket created");
        Ok(bucket)
    }

    fn get_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<Option<Bucket>> {
        let state = read_state(&self.state)?;
        match state.buckets.get(name) {
            Some(entry) => {
                check_bucket_preconditions(&entry.bucket, options)?;
                Ok(Some(entry.bucket.clone()))
            }
            None => Ok(None),
        }
    }

    fn list_buckets(&self, options: &[ListOption]) -> StoreResult<Page<Bucket>> {
        let state = read_state(&self.state)?;
        let entries = state
            .buckets
            .iter()
            .map(|(name, entry)| (name.clone(), entry.bucket.clone()))
            .collect();
        Ok(paginate(entries, options))
    }

    fn update_bucket(&self, info: BucketInfo, options: &[BucketOption]) -> StoreResult<Bucket> {
        let mut state = write_state(&self.state)?;
        let entry = state.bucket_mut(&info.name)?;
        check_bucket_preconditions(&entry.bucket, options)?;
        entry.bucket.info = info;
        entry.bucket.metageneration += 1;
        Ok(entry.bucket.clone())
    }

    fn delete_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<bool> {
        let mut state = write_state(&self.state)?;
        let Some(entry) = state.buckets.get(name) else {
            return Ok(false);
        };
        check_bucket_preconditions(&entry.bucket, options)?;
        if !entry.objects.is_empty() {
            return Err(StoreError::BucketNotEmpty(name.to_string()));
        }
        state.buckets.remove(name);
        info!(bucket = name, "bucket deleted");
        Ok(true)
    }

    /// Only flags the bucket; retention is not enforced.
    fn lock_retention_policy(&self, name: &str, options: &[BucketOption]) -> StoreResult<Bucket> {
        self.record("lock_retention_policy", (name, options))?;
        let mut state = write_state(&self.state)?;
        let entry = state.bucket_mut(name)?;
        entry.bucket.retention_locked = true;
        Ok(entry.bucket.clone())
    }

    // ---- Object payloads ----

    fn create_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object> {
        self.create_from_bytes(info, &[], options)
    }

    fn create_from_bytes(
        &self,
        info: ObjectInfo,
        content: &[u8],
        options: &[TargetOption],
    ) -> StoreResult<Object> {
        let key = decode_key(find_customer_key(options))?;
        commit(&self.state, info, content, key.as_ref(), &preconditions(options))
    }

    fn create_from_reader(
        &self,
        info: ObjectInfo,
        content: &mut dyn Read,
        options: &[WriteOption],
    ) -> StoreResult<Object> {
        let key = decode_key(find_customer_key(options))?;
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;
        verify_checksum(&buffer, checksum_option(options).as_deref())?;
        commit(&self.state, info, &buffer, key.as_ref(), &preconditions(options))
    }

    fn read_all_bytes(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Vec<u8>> {
        self.read_payload(id, options)
    }

    fn reader(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Box<dyn ReadChannel>> {
        let payload = self.read_payload(id, options)?;
        Ok(Box::new(BufferedReadChannel::new(payload)))
    }

    fn writer(&self, info: ObjectInfo, options: &[WriteOption]) -> StoreResult<Box<dyn WriteChannel>> {
        let key = decode_key(find_customer_key(options))?;
        read_state(&self.state)?.bucket(&info.id.bucket)?;
        Ok(Box::new(MemoryWriteChannel {
            state: Arc::clone(&self.state),
            info,
            key,
            preconditions: preconditions(options),
            checksum: checksum_option(options),
            buffer: Vec::new(),
        }))
    }

    fn writer_for_signed_url(&self, url: &str) -> StoreResult<Box<dyn WriteChannel>> {
        self.record("writer_for_signed_url", url)?;
        Err(StoreError::Unsupported(
            "the in-memory store does not serve signed URLs".into(),
        ))
    }

    // ---- Object metadata ----

    fn get_object(&self, id: &ObjectRef, options: &[GetOption]) -> StoreResult<Option<Object>> {
        let state = read_state(&self.state)?;
        let Some(stored) = state.stored(id)? else {
            return Ok(None);
        };
        check_preconditions(id, Some(&stored.object), &preconditions(options))?;
        let object = stored.object.clone();
        let fields = options.iter().find_map(|o| match o {
            GetOption::Fields(fields) => Some(fields.as_slice()),
            _ => None,
        });
        Ok(Some(match fields {
            Some(fields) => project(object, fields),
            None => object,
        }))
    }

    fn list_objects(&self, bucket: &str, options: &[ListOption]) -> StoreResult<Page<Object>> {
        let state = read_state(&self.state)?;
        let entries = state
            .bucket(bucket)?
            .objects
            .iter()
            .map(|(name, stored)| (name.clone(), stored.object.clone()))
            .collect();
        Ok(paginate(entries, options))
    }

    fn update_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object> {
        let mut state = write_state(&self.state)?;
        let stored = state
            .stored_mut(&info.id)?
            .ok_or_else(|| StoreError::ObjectNotFound(info.id.clone()))?;
        check_preconditions(&info.id, Some(&stored.object), &preconditions(options))?;
        info.patch(&mut stored.object.info);
        stored.object.metageneration += 1;
        stored.object.updated = Utc::now();
        debug!(
            object = %stored.object.id(),
            metageneration = stored.object.metageneration,
            removed = info.removed_metadata.len(),
            "object updated"
        );
        Ok(stored.object.clone())
    }

    fn delete_object(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<bool> {
        let mut state = write_state(&self.state)?;
        let Some(stored) = state.stored(id)? else {
            return Ok(false);
        };
        check_preconditions(id, Some(&stored.object), &preconditions(options))?;
        state.bucket_mut(&id.bucket)?.objects.remove(&id.name);
        debug!(object = %id, "object deleted");
        Ok(true)
    }

    /// Sources must share the target's bucket and are opened with the
    /// target's key, which also seals the result.
    fn compose(&self, request: ComposeRequest) -> StoreResult<Object> {
        if request.sources.is_empty() {
            return Err(StoreError::InvalidArgument("compose needs at least one source".into()));
        }
        let key = decode_key(find_customer_key(&request.target_options))?;
        let mut content = Vec::new();
        {
            let state = read_state(&self.state)?;
            for source in &request.sources {
                if source.bucket != request.target.id.bucket {
                    return Err(StoreError::InvalidArgument(format!(
                        "compose source {source} is outside bucket {}",
                        request.target.id.bucket
                    )));
                }
                let stored = state
                    .stored(source)?
                    .ok_or_else(|| StoreError::ObjectNotFound(source.clone()))?;
                content.extend(open_payload(source, stored, key.as_ref())?);
            }
        }
        commit(
            &self.state,
            request.target,
            &content,
            key.as_ref(),
            &preconditions(&request.target_options),
        )
    }

    /// Content type and metadata are inherited from the source when the
    /// target leaves them unset.
    fn copy(&self, request: CopyRequest) -> StoreResult<Object> {
        let source_key = decode_key(find_customer_key(&request.source_options))?;
        let target_key = decode_key(find_customer_key(&request.target_options))?;
        let (content, source) = {
            let state = read_state(&self.state)?;
            let stored = state
                .stored(&request.source)?
                .ok_or_else(|| StoreError::ObjectNotFound(request.source.clone()))?;
            check_preconditions(
                &request.source,
                Some(&stored.object),
                &preconditions(&request.source_options),
            )?;
            (
                open_payload(&request.source, stored, source_key.as_ref())?,
                stored.object.clone(),
            )
        };
        let mut target = request.target;
        if target.content_type.is_none() {
            target.content_type = source.info.content_type;
        }
        if target.metadata.is_none() {
            target.metadata = source.info.metadata;
        }
        commit(
            &self.state,
            target,
            &content,
            target_key.as_ref(),
            &preconditions(&request.target_options),
        )
    }

    /// The URL names the object, method and expiry but carries no
    /// signature.
    fn sign_url(
        &self,
        info: &ObjectInfo,
        valid_for: Duration,
        options: &[SignUrlOption],
    ) -> StoreResult<String> {
        self.record("sign_url", (&info.id, valid_for, options))?;
        let method = options
            .iter()
            .find_map(|o| match o {
                SignUrlOption::HttpMethod(m) => Some(m.as_str()),
                SignUrlOption::ContentType(_) => None,
            })
            .unwrap_or("GET");
        let valid_secs = i64::try_from(valid_for.as_secs())
            .map_err(|_| StoreError::InvalidArgument("signed url validity too long".into()))?;
        let expires = Utc::now().timestamp().saturating_add(valid_secs);
        Ok(format!(
            "{URL_BASE}/{}/{}?method={method}&expires={expires}",
            info.id.bucket, info.id.name
        ))
    }

    // ---- Access control ----

    fn get_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<Option<Acl>> {
        self.record("get_acl", (scope, entity))?;
        Ok(None)
    }

    fn create_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl> {
        self.record("create_acl", (scope, &acl))?;
        Ok(acl)
    }

    fn update_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl> {
        self.record("update_acl", (scope, &acl))?;
        Ok(acl)
    }

    fn delete_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<bool> {
        self.record("delete_acl", (scope, entity))?;
        Ok(false)
    }

    fn list_acls(&self, scope: &AclScope) -> StoreResult<Vec<Acl>> {
        self.record("list_acls", scope)?;
        Ok(Vec::new())
    }

    fn get_iam_policy(&self, bucket: &str, options: &[BucketOption]) -> StoreResult<IamPolicy> {
        self.record("get_iam_policy", (bucket, options))?;
        Ok(IamPolicy::default())
    }

    fn set_iam_policy(
        &self,
        bucket: &str,
        policy: IamPolicy,
        options: &[BucketOption],
    ) -> StoreResult<IamPolicy> {
        self.record("set_iam_policy", (bucket, &policy, options))?;
        Ok(policy)
    }

    /// Nothing is granted.
    fn test_iam_permissions(
        &self,
        bucket: &str,
        permissions: &[String],
        options: &[BucketOption],
    ) -> StoreResult<Vec<bool>> {
        self.record("test_iam_permissions", (bucket, permissions, options))?;
        Ok(vec![false; permissions.len()])
    }

    fn service_account(&self, project_id: &str) -> StoreResult<ServiceAccount> {
        self.record("service_account", project_id)?;
        Ok(ServiceAccount {
            email: format!("service-{project_id}@veil-storage.iam.invalid"),
        })
    }

    // ---- HMAC key administration ----

    /// Returns a fresh random key that is not remembered.
    fn create_hmac_key(&self, service_account: &str) -> StoreResult<HmacKey> {
        self.record("create_hmac_key", service_account)?;
        let mut rng = rand::thread_rng();
        let mut id_bytes = [0u8; 12];
        rng.fill_bytes(&mut id_bytes);
        let mut secret_bytes = [0u8; 30];
        rng.fill_bytes(&mut secret_bytes);
        Ok(HmacKey {
            secret: STANDARD.encode(secret_bytes),
            metadata: HmacKeyMetadata {
                access_id: format!("VEIL{}", hex::encode_upper(id_bytes)),
                service_account: service_account.to_string(),
                state: HmacKeyState::Active,
                created: Utc::now(),
            },
        })
    }

    fn list_hmac_keys(&self, service_account: Option<&str>) -> StoreResult<Vec<HmacKeyMetadata>> {
        self.record("list_hmac_keys", service_account)?;
        Ok(Vec::new())
    }

    fn get_hmac_key(&self, access_id: &str) -> StoreResult<HmacKeyMetadata> {
        self.record("get_hmac_key", access_id)?;
        Err(StoreError::HmacKeyNotFound(access_id.to_string()))
    }

    fn update_hmac_key_state(
        &self,
        access_id: &str,
        state: HmacKeyState,
    ) -> StoreResult<HmacKeyMetadata> {
        self.record("update_hmac_key_state", (access_id, state))?;
        Err(StoreError::HmacKeyNotFound(access_id.to_string()))
    }

    fn delete_hmac_key(&self, access_id: &str) -> StoreResult<()> {
        self.record("delete_hmac_key", access_id)?;
        Err(StoreError::HmacKeyNotFound(access_id.to_string()))
    }
}
