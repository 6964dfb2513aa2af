use std::io::Read;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info};
use veil_kms::{
    ClientMetadata, Connector, ContentKey, KeyRequest, KeySessionProvider, Profile, ProfileStore,
};
use veil_store::{
    Acl, AclEntity, AclScope, Bucket, BucketInfo, BucketOption, ComposeRequest, CopyRequest,
    GetOption, HmacKey, HmacKeyMetadata, HmacKeyState, IamPolicy, ListOption, Object, ObjectInfo,
    ObjectStorage, Page, ReadChannel, ServiceAccount, SignUrlOption, SourceOption, StoreError,
    StoreResult, TargetOption, WriteChannel, WriteOption,
};
use veil_types::{KeyAttributes, ObjectRef};

use crate::config::EnvelopeConfig;
use crate::error::{key_service_failure, EnvelopeResult};
use crate::lifecycle::{self, LifecycleSettings};
use crate::options::prepend_option;

/// Forward trait methods to `self.inner` unchanged.
macro_rules! delegate {
    ($( fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty; )*) => {
        $(
            fn $name(&self $(, $arg: $ty)*) -> $ret {
                self.inner.$name($($arg),*)
            }
        )*
    };
}

/// An [`ObjectStorage`] that protects every payload it writes with its own
/// content key.
///
/// Writes mint a key through the session provider, record its id in the
/// object's metadata and hand the key to the backing store as a
/// customer-supplied key. Reads look the id up again and pass the resolved
/// key along. Everything that does not move payload bytes is forwarded to
/// the backing store untouched.
///
/// Objects without a key reference are read as stored. Objects with one are
/// never read without their key: a key-service failure fails the read.
pub struct EncryptedStorage<S> {
    inner: S,
    provider: Arc<dyn KeySessionProvider>,
    settings: RwLock<LifecycleSettings>,
}

impl<S: ObjectStorage> EncryptedStorage<S> {
    pub fn new(inner: S, provider: Arc<dyn KeySessionProvider>) -> Self {
        Self {
            inner,
            provider,
            settings: RwLock::new(LifecycleSettings::default()),
        }
    }

    /// Build the facade and its session provider from configuration. A
    /// profile still has to be set before the first payload operation.
    pub fn from_config<C>(inner: S, config: &EnvelopeConfig, connector: C) -> EnvelopeResult<Self>
    where
        C: Connector + 'static,
        C::Session: Clone + Sync,
    {
        let provider = config.build_provider(connector)?;
        Ok(Self {
            inner,
            provider,
            settings: RwLock::new(LifecycleSettings {
                default_attributes: config.default_attributes.clone(),
                metadata_capture: config.metadata_capture,
            }),
        })
    }

    /// The backing store. Anything done through it bypasses key handling.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn provider(&self) -> &Arc<dyn KeySessionProvider> {
        &self.provider
    }

    // ---- Settings ----

    pub fn default_attributes(&self) -> EnvelopeResult<KeyAttributes> {
        Ok(self.settings()?.default_attributes)
    }

    /// Replace the attributes merged into every key minted from now on.
    pub fn set_default_attributes(&self, attributes: KeyAttributes) -> EnvelopeResult<()> {
        self.settings_mut(|s| s.default_attributes = attributes)
    }

    pub fn metadata_capture(&self) -> EnvelopeResult<bool> {
        Ok(self.settings()?.metadata_capture)
    }

    pub fn set_metadata_capture(&self, enabled: bool) -> EnvelopeResult<()> {
        self.settings_mut(|s| s.metadata_capture = enabled)?;
        info!(enabled, "metadata capture changed");
        Ok(())
    }

    pub fn client_metadata(&self) -> EnvelopeResult<ClientMetadata> {
        Ok(self.provider.client_metadata()?)
    }

    pub fn set_client_metadata(&self, metadata: ClientMetadata) -> EnvelopeResult<()> {
        Ok(self.provider.set_client_metadata(metadata)?)
    }

    pub fn set_profile(&self, profile: Profile) -> EnvelopeResult<()> {
        Ok(self.provider.set_profile(profile)?)
    }

    /// Load the active profile from `store` and authenticate with it.
    pub fn set_profile_store(&self, store: &dyn ProfileStore) -> EnvelopeResult<()> {
        Ok(self.provider.set_profile_store(store)?)
    }

    fn settings(&self) -> StoreResult<LifecycleSettings> {
        let settings = self
            .settings
            .read()
            .map_err(|e| StoreError::Internal(format!("settings lock poisoned: {e}")))?;
        Ok(settings.clone())
    }

    fn settings_mut(&self, update: impl FnOnce(&mut LifecycleSettings)) -> EnvelopeResult<()> {
        let mut settings = self
            .settings
            .write()
            .map_err(|e| StoreError::Internal(format!("settings lock poisoned: {e}")))?;
        update(&mut settings);
        Ok(())
    }

    // ---- Payload operations with an explicit key request ----

    pub fn create_with_key(
        &self,
        info: ObjectInfo,
        content: &[u8],
        request: &KeyRequest,
        options: &[TargetOption],
    ) -> StoreResult<Object> {
        let (info, key) = self.protect(info, request)?;
        let options = prepend_option(TargetOption::encryption_key(&key.secret), Some(options));
        self.inner.create_from_bytes(info, content, &options)
    }

    pub fn create_from_reader_with_key(
        &self,
        info: ObjectInfo,
        content: &mut dyn Read,
        request: &KeyRequest,
        options: &[WriteOption],
    ) -> StoreResult<Object> {
        let (info, key) = self.protect(info, request)?;
        let options = prepend_option(WriteOption::encryption_key(&key.secret), Some(options));
        self.inner.create_from_reader(info, content, &options)
    }

    pub fn writer_with_key(
        &self,
        info: ObjectInfo,
        request: &KeyRequest,
        options: &[WriteOption],
    ) -> StoreResult<Box<dyn WriteChannel>> {
        let (info, key) = self.protect(info, request)?;
        let options = prepend_option(WriteOption::encryption_key(&key.secret), Some(options));
        self.inner.writer(info, &options)
    }

    // ---- Reads that also return the content key ----

    /// The payload and the key that protected it, `None` for an
    /// unprotected object.
    pub fn read_all_bytes_and_key(
        &self,
        id: &ObjectRef,
        options: &[SourceOption],
    ) -> StoreResult<(Vec<u8>, Option<ContentKey>)> {
        let key = lifecycle::resolve_for_read(&self.inner, self.provider.as_ref(), id)?;
        let options = source_options(key.as_ref(), options);
        let payload = self.inner.read_all_bytes(id, &options)?;
        Ok((payload, key))
    }

    pub fn reader_and_key(
        &self,
        id: &ObjectRef,
        options: &[SourceOption],
    ) -> StoreResult<(Box<dyn ReadChannel>, Option<ContentKey>)> {
        let key = lifecycle::resolve_for_read(&self.inner, self.provider.as_ref(), id)?;
        let options = source_options(key.as_ref(), options);
        let channel = self.inner.reader(id, &options)?;
        Ok((channel, key))
    }

    /// Mint a key for `info` and return the info with the key reference
    /// stamped into its metadata. Nothing reaches the backing store if
    /// minting fails.
    fn protect(&self, info: ObjectInfo, request: &KeyRequest) -> StoreResult<(ObjectInfo, ContentKey)> {
        let settings = self.settings()?;
        let minted = lifecycle::mint_for_write(
            self.provider.as_ref(),
            &settings,
            info.metadata.as_ref(),
            request,
        )
        .map_err(key_service_failure)?;
        debug!(object = %info.id, key_id = %minted.key.id, "content key minted");
        let info = ObjectInfo {
            metadata: Some(minted.metadata),
            ..info
        };
        Ok((info, minted.key))
    }
}

fn source_options(key: Option<&ContentKey>, options: &[SourceOption]) -> Vec<SourceOption> {
    match key {
        Some(key) => prepend_option(SourceOption::decryption_key(&key.secret), Some(options)),
        None => options.to_vec(),
    }
}

impl<S: ObjectStorage> ObjectStorage for EncryptedStorage<S> {
    // ---- Payload routes ----

    fn create_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object> {
        self.create_with_key(info, &[], &KeyRequest::new(), options)
    }

    fn create_from_bytes(
        &self,
        info: ObjectInfo,
        content: &[u8],
        options: &[TargetOption],
    ) -> StoreResult<Object> {
        self.create_with_key(info, content, &KeyRequest::new(), options)
    }

    fn create_from_reader(
        &self,
        info: ObjectInfo,
        content: &mut dyn Read,
        options: &[WriteOption],
    ) -> StoreResult<Object> {
        self.create_from_reader_with_key(info, content, &KeyRequest::new(), options)
    }

    fn read_all_bytes(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Vec<u8>> {
        Ok(self.read_all_bytes_and_key(id, options)?.0)
    }

    fn reader(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Box<dyn ReadChannel>> {
        Ok(self.reader_and_key(id, options)?.0)
    }

    fn writer(&self, info: ObjectInfo, options: &[WriteOption]) -> StoreResult<Box<dyn WriteChannel>> {
        self.writer_with_key(info, &KeyRequest::new(), options)
    }

    /// A signed URL uploads straight to the backing store, where no key can
    /// be attached.
    fn writer_for_signed_url(&self, _url: &str) -> StoreResult<Box<dyn WriteChannel>> {
        Err(StoreError::Unsupported(
            "writing through a signed URL would store an unprotected payload".into(),
        ))
    }

    // ---- Pass-through ----

    // Metadata-only: a caller may overwrite or clear the key reference here.
    delegate! {
        fn update_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object>;
        fn update_objects(&self, infos: Vec<ObjectInfo>) -> Vec<StoreResult<Object>>;
    }

    delegate! {
        fn create_bucket(&self, info: BucketInfo, options: &[BucketOption]) -> StoreResult<Bucket>;
        fn get_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<Option<Bucket>>;
        fn list_buckets(&self, options: &[ListOption]) -> StoreResult<Page<Bucket>>;
        fn update_bucket(&self, info: BucketInfo, options: &[BucketOption]) -> StoreResult<Bucket>;
        fn delete_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<bool>;
        fn lock_retention_policy(&self, name: &str, options: &[BucketOption]) -> StoreResult<Bucket>;

        fn get_object(&self, id: &ObjectRef, options: &[GetOption]) -> StoreResult<Option<Object>>;
        fn list_objects(&self, bucket: &str, options: &[ListOption]) -> StoreResult<Page<Object>>;
        fn delete_object(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<bool>;
        fn compose(&self, request: ComposeRequest) -> StoreResult<Object>;
        fn copy(&self, request: CopyRequest) -> StoreResult<Object>;
        fn sign_url(&self, info: &ObjectInfo, valid_for: Duration, options: &[SignUrlOption]) -> StoreResult<String>;
        fn get_objects(&self, ids: &[ObjectRef]) -> StoreResult<Vec<Option<Object>>>;
        fn delete_objects(&self, ids: &[ObjectRef]) -> StoreResult<Vec<bool>>;

        fn get_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<Option<Acl>>;
        fn create_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl>;
        fn update_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl>;
        fn delete_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<bool>;
        fn list_acls(&self, scope: &AclScope) -> StoreResult<Vec<Acl>>;
        fn get_iam_policy(&self, bucket: &str, options: &[BucketOption]) -> StoreResult<IamPolicy>;
        fn set_iam_policy(&self, bucket: &str, policy: IamPolicy, options: &[BucketOption]) -> StoreResult<IamPolicy>;
        fn test_iam_permissions(&self, bucket: &str, permissions: &[String], options: &[BucketOption]) -> StoreResult<Vec<bool>>;
        fn service_account(&self, project_id: &str) -> StoreResult<ServiceAccount>;

        fn create_hmac_key(&self, service_account: &str) -> StoreResult<HmacKey>;
        fn list_hmac_keys(&self, service_account: Option<&str>) -> StoreResult<Vec<HmacKeyMetadata>>;
        fn get_hmac_key(&self, access_id: &str) -> StoreResult<HmacKeyMetadata>;
        fn update_hmac_key_state(&self, access_id: &str, state: HmacKeyState) -> StoreResult<HmacKeyMetadata>;
        fn delete_hmac_key(&self, access_id: &str) -> StoreResult<()>;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Write;
    use std::thread;

    use proptest::prelude::*;
    use veil_kms::{
        InMemoryKeyService, KmsError, PooledSessionProvider, StaticProfileStore,
        TemplateSessionProvider,
    };
    use veil_store::{AclRole, InMemoryStorage};
    use veil_types::{KeyId, ObjectMetadata};

    use super::*;
    use crate::binding::KEY_ID_METADATA;
    use crate::config::SessionStrategy;
    use crate::error::key_service_error;

    fn profile() -> Profile {
        Profile::new("p1", "https://keys.example.com", "ks", "cred")
    }

    fn storage() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.create_bucket(BucketInfo::new("b"), &[]).unwrap();
        storage
    }

    fn facade() -> (InMemoryKeyService, EncryptedStorage<InMemoryStorage>) {
        let service = InMemoryKeyService::new();
        service.enroll(&profile()).unwrap();
        let provider = TemplateSessionProvider::new(service.connector());
        provider.set_profile(profile()).unwrap();
        (service, EncryptedStorage::new(storage(), Arc::new(provider)))
    }

    fn obj(name: &str) -> ObjectRef {
        ObjectRef::new("b", name)
    }

    fn key_ref(object: &Object) -> &str {
        object.metadata().unwrap()[KEY_ID_METADATA].as_str()
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_service, facade) = facade();
        let created = facade
            .create_from_bytes(ObjectInfo::new(obj("o1")), b"Hello, World!", &[])
            .unwrap();
        assert!(!key_ref(&created).is_empty());
        assert_eq!(facade.read_all_bytes(&obj("o1"), &[]).unwrap(), b"Hello, World!");
    }

    #[test]
    fn stored_payload_is_not_plaintext() {
        let (_service, facade) = facade();
        facade
            .create_from_bytes(ObjectInfo::new(obj("o1")), b"Hello, World!", &[])
            .unwrap();
        let at_rest = facade.inner().stored_payload(&obj("o1")).unwrap().unwrap();
        assert_ne!(at_rest, b"Hello, World!");
        let err = facade.inner().read_all_bytes(&obj("o1"), &[]).unwrap_err();
        assert!(matches!(err, StoreError::EncryptionKeyRequired(_)));
    }

    #[test]
    fn distinct_objects_get_distinct_keys() {
        let (_service, facade) = facade();
        let a = facade.create_from_bytes(ObjectInfo::new(obj("a")), b"x", &[]).unwrap();
        let b = facade.create_from_bytes(ObjectInfo::new(obj("b")), b"x", &[]).unwrap();
        assert_ne!(key_ref(&a), key_ref(&b));
    }

    #[test]
    fn caller_metadata_survives_stamping() {
        let (_service, facade) = facade();
        let info = ObjectInfo::new(obj("o1")).with_metadata_entry("owner", "alice");
        let created = facade.create_from_bytes(info, b"x", &[]).unwrap();
        assert_eq!(created.metadata().unwrap()["owner"], "alice");
        assert!(created.metadata().unwrap().contains_key(KEY_ID_METADATA));
    }

    #[test]
    fn caller_options_are_kept() {
        let (_service, facade) = facade();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();
        let err = facade
            .create_from_bytes(ObjectInfo::new(obj("o1")), b"y", &[TargetOption::DoesNotExist])
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));
    }

    #[test]
    fn unprotected_object_reads_without_key_service() {
        let (service, facade) = facade();
        facade
            .inner()
            .create_from_bytes(ObjectInfo::new(obj("plain")), b"raw bytes", &[])
            .unwrap();
        let before = service.request_count().unwrap();
        let (payload, key) = facade.read_all_bytes_and_key(&obj("plain"), &[]).unwrap();
        assert_eq!(payload, b"raw bytes");
        assert!(key.is_none());
        assert_eq!(service.request_count().unwrap(), before);
    }

    #[test]
    fn read_of_missing_object_is_not_found() {
        let (_service, facade) = facade();
        let err = facade.read_all_bytes(&obj("missing"), &[]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn metadata_capture_toggle() {
        let (_service, facade) = facade();
        let info = || ObjectInfo::new(obj("o1")).with_metadata_entry("k", "v");

        facade.set_metadata_capture(true).unwrap();
        facade.create_from_bytes(info(), b"x", &[]).unwrap();
        let (_, key) = facade.read_all_bytes_and_key(&obj("o1"), &[]).unwrap();
        assert_eq!(key.unwrap().attributes.get("k").unwrap(), &["v".to_string()]);

        facade.set_metadata_capture(false).unwrap();
        facade.create_from_bytes(info(), b"x", &[]).unwrap();
        let (_, key) = facade.read_all_bytes_and_key(&obj("o1"), &[]).unwrap();
        assert!(!key.unwrap().attributes.contains_key("k"));
    }

    #[test]
    fn default_attributes_are_copied_per_call() {
        let (_service, facade) = facade();
        facade
            .set_default_attributes(KeyAttributes::new().with("team", &["storage"]))
            .unwrap();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();
        facade.set_default_attributes(KeyAttributes::new()).unwrap();

        let (_, key) = facade.read_all_bytes_and_key(&obj("o1"), &[]).unwrap();
        assert_eq!(key.unwrap().attributes.get("team").unwrap(), &["storage".to_string()]);
        assert!(facade.default_attributes().unwrap().is_empty());
    }

    #[test]
    fn explicit_key_request_reaches_key_service() {
        let (service, facade) = facade();
        let request = KeyRequest::new()
            .with_ref_id("invoice-7")
            .with_attributes(KeyAttributes::new().with("level", &["restricted"]))
            .with_mutable_attributes(KeyAttributes::new().with("state", &["draft"]));
        let created = facade
            .create_with_key(ObjectInfo::new(obj("o1")), b"x", &request, &[])
            .unwrap();
        let id = KeyId::new(key_ref(&created)).unwrap();
        assert_eq!(service.key_ref(&id).unwrap().as_deref(), Some("invoice-7"));

        let (_, key) = facade.read_all_bytes_and_key(&obj("o1"), &[]).unwrap();
        let key = key.unwrap();
        assert_eq!(key.attributes.get("level").unwrap(), &["restricted".to_string()]);
        assert_eq!(key.mutable_attributes.get("state").unwrap(), &["draft".to_string()]);
    }

    #[test]
    fn overwritten_key_reference_fails_read() {
        let (_service, facade) = facade();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"secret", &[]).unwrap();

        let mut metadata = ObjectMetadata::new();
        metadata.insert(KEY_ID_METADATA.to_string(), "bogus".to_string());
        facade
            .update_object(ObjectInfo::new(obj("o1")).with_metadata(metadata), &[])
            .unwrap();

        let err = facade.read_all_bytes(&obj("o1"), &[]).unwrap_err();
        assert!(matches!(key_service_error(&err), Some(KmsError::KeyNotFound(_))));
        assert!(err.is_not_found());
    }

    #[test]
    fn removed_key_reference_fails_read() {
        let (_service, facade) = facade();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"secret", &[]).unwrap();
        let updated = facade
            .update_object(
                ObjectInfo::new(obj("o1")).without_metadata_entry(KEY_ID_METADATA),
                &[],
            )
            .unwrap();
        assert!(!updated.metadata().unwrap().contains_key(KEY_ID_METADATA));
        let err = facade.read_all_bytes(&obj("o1"), &[]).unwrap_err();
        assert!(matches!(err, StoreError::EncryptionKeyRequired(_)));
    }

    #[test]
    fn content_type_update_keeps_object_readable() {
        let (_service, facade) = facade();
        let info = ObjectInfo::new(obj("o1")).with_metadata_entry("owner", "alice");
        facade.create_from_bytes(info, b"secret", &[]).unwrap();

        let updated = facade
            .update_object(ObjectInfo::new(obj("o1")).with_content_type("text/plain"), &[])
            .unwrap();
        assert_eq!(updated.content_type(), Some("text/plain"));
        assert_eq!(updated.metadata().unwrap()["owner"], "alice");
        assert!(!key_ref(&updated).is_empty());
        assert_eq!(facade.read_all_bytes(&obj("o1"), &[]).unwrap(), b"secret");
    }

    #[test]
    fn metadata_update_keeps_key_reference() {
        let (_service, facade) = facade();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"secret", &[]).unwrap();
        let updated = facade
            .update_objects(vec![ObjectInfo::new(obj("o1")).with_metadata_entry("stage", "final")])
            .remove(0)
            .unwrap();
        assert_eq!(updated.metadata().unwrap()["stage"], "final");
        assert_eq!(facade.read_all_bytes(&obj("o1"), &[]).unwrap(), b"secret");
    }

    #[test]
    fn denied_read_is_surfaced() {
        let (service, facade) = facade();
        let info = ObjectInfo::new(obj("o1"));
        let request = KeyRequest::new().with_attributes(KeyAttributes::new().with("level", &["secret"]));
        facade.create_with_key(info, b"x", &request, &[]).unwrap();

        service.deny_attribute("level", "secret").unwrap();
        let err = facade.read_all_bytes(&obj("o1"), &[]).unwrap_err();
        assert_eq!(err.code(), 403);
        assert!(key_service_error(&err).unwrap().is_denied());
    }

    #[test]
    fn failed_mint_stores_nothing() {
        let (service, facade) = facade();
        service.deny_attribute("level", "secret").unwrap();
        facade
            .set_default_attributes(KeyAttributes::new().with("level", &["secret"]))
            .unwrap();
        let err = facade
            .create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[])
            .unwrap_err();
        assert!(key_service_error(&err).unwrap().is_denied());
        assert_eq!(facade.inner().object_count().unwrap(), 0);
    }

    #[test]
    fn key_service_timeout_propagates() {
        let (service, facade) = facade();
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();
        service.set_unavailable(true).unwrap();

        let err = facade.read_all_bytes(&obj("o1"), &[]).unwrap_err();
        assert!(matches!(key_service_error(&err), Some(KmsError::Timeout(_))));
        assert_eq!(err.code(), 504);
        let err = facade
            .create_from_bytes(ObjectInfo::new(obj("o2")), b"x", &[])
            .unwrap_err();
        assert!(matches!(key_service_error(&err), Some(KmsError::Timeout(_))));
    }

    #[test]
    fn missing_profile_fails_immediately() {
        let service = InMemoryKeyService::new();
        let provider = TemplateSessionProvider::new(service.connector());
        let facade = EncryptedStorage::new(storage(), Arc::new(provider));
        let err = facade
            .create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[])
            .unwrap_err();
        assert!(matches!(key_service_error(&err), Some(KmsError::NoActiveCredential)));
        assert_eq!(service.handshake_count().unwrap(), 0);
    }

    #[test]
    fn empty_create_is_protected() {
        let (_service, facade) = facade();
        let created = facade.create_object(ObjectInfo::new(obj("empty")), &[]).unwrap();
        assert!(!key_ref(&created).is_empty());
        assert!(facade.read_all_bytes(&obj("empty"), &[]).unwrap().is_empty());
    }

    #[test]
    fn writer_and_reader_channels() {
        let (_service, facade) = facade();
        let mut channel = facade.writer(ObjectInfo::new(obj("stream")), &[]).unwrap();
        channel.write_all(b"streamed ").unwrap();
        channel.write_all(b"payload").unwrap();
        let created = channel.close().unwrap();
        assert!(!key_ref(&created).is_empty());

        let (mut reader, key) = facade.reader_and_key(&obj("stream"), &[]).unwrap();
        assert_eq!(key.unwrap().id.as_str(), key_ref(&created));
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, b"streamed payload");
    }

    #[test]
    fn create_from_reader_and_path() {
        let (_service, facade) = facade();
        let mut content: &[u8] = b"from a reader";
        facade
            .create_from_reader(ObjectInfo::new(obj("r")), &mut content, &[])
            .unwrap();
        assert_eq!(facade.read_all_bytes(&obj("r"), &[]).unwrap(), b"from a reader");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"from a file").unwrap();
        let created = facade
            .create_from_path(ObjectInfo::new(obj("f")), &path, &[])
            .unwrap();
        assert!(!key_ref(&created).is_empty());
        assert_eq!(facade.read_all_bytes(&obj("f"), &[]).unwrap(), b"from a file");
    }

    #[test]
    fn signed_url_writer_is_unsupported() {
        let (_service, facade) = facade();
        let url = facade
            .sign_url(
                &ObjectInfo::new(obj("o1")),
                Duration::from_secs(60),
                &[SignUrlOption::HttpMethod("PUT".into())],
            )
            .unwrap();
        assert!(matches!(
            facade.writer_for_signed_url(&url),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn pass_through_operations_reach_backing_store() {
        let (service, facade) = facade();
        facade.create_bucket(BucketInfo::new("other"), &[]).unwrap();
        assert!(facade.inner().get_bucket("other", &[]).unwrap().is_some());
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();

        let before = service.request_count().unwrap();
        let page = facade.list_objects("b", &[]).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(facade.get_object(&obj("o1"), &[]).unwrap().is_some());
        assert_eq!(facade.get_objects(&[obj("o1"), obj("nope")]).unwrap().len(), 2);
        assert_eq!(facade.delete_objects(&[obj("o1")]).unwrap(), vec![true]);
        assert!(facade.delete_bucket("other", &[]).unwrap());
        assert_eq!(service.request_count().unwrap(), before);
    }

    #[test]
    fn administrative_calls_are_forwarded_unchanged() {
        let (service, facade) = facade();
        let scope = AclScope::Object(obj("o1"));
        let acl = Acl::new(AclEntity::User("alice@example.com".into()), AclRole::Owner);
        let policy = IamPolicy::default().with_binding("roles/storage.objectViewer", "user:bob");
        let permissions = vec!["storage.objects.get".to_string()];
        let bucket_options = [BucketOption::MetagenerationMatch(1)];

        facade.update_acl(&scope, acl.clone()).unwrap();
        facade.set_iam_policy("b", policy.clone(), &bucket_options).unwrap();
        facade.test_iam_permissions("b", &permissions, &[]).unwrap();
        facade.create_hmac_key("sa@example.com").unwrap();
        assert!(facade.delete_hmac_key("VEIL1").is_err());
        facade.lock_retention_policy("b", &bucket_options).unwrap();

        let calls = facade.inner().recorded_calls().unwrap();
        let operations: Vec<_> = calls.iter().map(|c| c.operation).collect();
        assert_eq!(
            operations,
            [
                "update_acl",
                "set_iam_policy",
                "test_iam_permissions",
                "create_hmac_key",
                "delete_hmac_key",
                "lock_retention_policy",
            ]
        );
        assert_eq!(calls[0].arguments, format!("{:?}", (&scope, &acl)));
        assert_eq!(
            calls[1].arguments,
            format!("{:?}", ("b", &policy, &bucket_options[..]))
        );
        assert_eq!(calls[3].arguments, format!("{:?}", "sa@example.com"));
        assert_eq!(calls[5].arguments, format!("{:?}", ("b", &bucket_options[..])));
        assert_eq!(service.request_count().unwrap(), 0);
    }

    #[test]
    fn profile_store_reconfigures_provider() {
        let (service, facade) = facade();
        let next = Profile::new("p2", "https://keys.example.com", "ks2", "cred2");
        service.enroll(&next).unwrap();
        facade.set_profile_store(&StaticProfileStore::new(next)).unwrap();
        let created = facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();
        assert!(key_ref(&created).starts_with("ks2"));

        let err = facade.set_profile_store(&StaticProfileStore::empty()).unwrap_err();
        assert!(matches!(err, crate::EnvelopeError::Kms(KmsError::NoActiveCredential)));
    }

    #[test]
    fn client_metadata_reaches_key_service() {
        let (service, facade) = facade();
        let md = ClientMetadata::new().with("application-name", "veil-tests");
        facade.set_client_metadata(md.clone()).unwrap();
        assert_eq!(facade.client_metadata().unwrap(), md);
        facade.create_from_bytes(ObjectInfo::new(obj("o1")), b"x", &[]).unwrap();
        assert_eq!(service.last_client_metadata().unwrap(), Some(md));
    }

    #[test]
    fn pooled_strategy_from_config() {
        let service = InMemoryKeyService::new();
        service.enroll(&profile()).unwrap();
        let config = EnvelopeConfig {
            metadata_capture: true,
            session_strategy: SessionStrategy::Pooled { max_idle: Some(2) },
            ..Default::default()
        };
        let facade = EncryptedStorage::from_config(storage(), &config, service.connector()).unwrap();
        assert!(facade.metadata_capture().unwrap());
        facade.set_profile(profile()).unwrap();

        for name in ["a", "b", "c"] {
            facade.create_from_bytes(ObjectInfo::new(obj(name)), name.as_bytes(), &[]).unwrap();
        }
        assert_eq!(facade.read_all_bytes(&obj("c"), &[]).unwrap(), b"c");
        assert_eq!(service.handshake_count().unwrap(), 1);
    }

    #[test]
    fn concurrent_writes_through_one_facade() {
        let service = InMemoryKeyService::new();
        service.enroll(&profile()).unwrap();
        let pool = PooledSessionProvider::new(service.connector());
        pool.set_profile(profile()).unwrap();
        let facade = EncryptedStorage::new(storage(), Arc::new(pool));

        let ids: Vec<String> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let facade = &facade;
                    s.spawn(move || {
                        let name = format!("o{i}");
                        let created = facade
                            .create_from_bytes(ObjectInfo::new(obj(&name)), name.as_bytes(), &[])
                            .unwrap();
                        key_ref(&created).to_string()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let distinct: HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), 16);
        assert_eq!(service.overlapping_uses().unwrap(), 0);
        for i in 0..16 {
            let name = format!("o{i}");
            assert_eq!(facade.read_all_bytes(&obj(&name), &[]).unwrap(), name.as_bytes());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_payload_and_attributes_round_trip(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            attributes in proptest::collection::btree_map(
                "[a-z]{1,6}",
                proptest::collection::vec("[a-z0-9]{0,6}", 1..3),
                0..4,
            ),
        ) {
            let (_service, facade) = facade();
            let attributes = KeyAttributes::from(attributes);
            let request = KeyRequest::new().with_attributes(attributes.clone());
            facade.create_with_key(ObjectInfo::new(obj("p")), &payload, &request, &[]).unwrap();
            let (read, key) = facade.read_all_bytes_and_key(&obj("p"), &[]).unwrap();
            prop_assert_eq!(read, payload);
            prop_assert_eq!(key.unwrap().attributes, attributes);
        }
    }
}
