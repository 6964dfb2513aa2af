use std::io::Read;
use std::path::Path;
use std::time::Duration;

use veil_types::ObjectRef;

use crate::channel::{ReadChannel, WriteChannel};
use crate::error::StoreResult;
use crate::model::{
    Acl, AclEntity, AclScope, Bucket, BucketInfo, ComposeRequest, CopyRequest, HmacKey,
    HmacKeyMetadata, HmacKeyState, IamPolicy, Object, ObjectInfo, Page, ServiceAccount,
};
use crate::options::{
    BucketOption, GetOption, ListOption, SignUrlOption, SourceOption, TargetOption, WriteOption,
};

/// The full operation surface of an object-storage service.
///
/// All implementations must satisfy these rules:
/// - Payload-bearing operations honour a customer-supplied key option: an
///   object written with an encryption key can only be read back with the
///   same key.
/// - Metadata-only operations (`get_object`, `update_object`) never need
///   the object's key.
/// - Preconditions carried by options are checked atomically with the
///   operation they guard.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStorage: Send + Sync {
    // ---- Buckets ----

    fn create_bucket(&self, info: BucketInfo, options: &[BucketOption]) -> StoreResult<Bucket>;

    /// Returns `Ok(None)` if the bucket does not exist.
    fn get_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<Option<Bucket>>;

    fn list_buckets(&self, options: &[ListOption]) -> StoreResult<Page<Bucket>>;

    fn update_bucket(&self, info: BucketInfo, options: &[BucketOption]) -> StoreResult<Bucket>;

    /// Delete an empty bucket. Returns `true` if the bucket existed.
    fn delete_bucket(&self, name: &str, options: &[BucketOption]) -> StoreResult<bool>;

    /// Make the bucket's retention policy permanent.
    fn lock_retention_policy(&self, name: &str, options: &[BucketOption]) -> StoreResult<Bucket>;

    // ---- Object payloads ----

    /// Create an object with an empty payload.
    fn create_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object>;

    fn create_from_bytes(
        &self,
        info: ObjectInfo,
        content: &[u8],
        options: &[TargetOption],
    ) -> StoreResult<Object>;

    fn create_from_reader(
        &self,
        info: ObjectInfo,
        content: &mut dyn Read,
        options: &[WriteOption],
    ) -> StoreResult<Object>;

    /// Upload a local file. Default implementation streams it through
    /// [`Self::create_from_reader`].
    fn create_from_path(
        &self,
        info: ObjectInfo,
        path: &Path,
        options: &[WriteOption],
    ) -> StoreResult<Object> {
        let mut file = std::fs::File::open(path)?;
        self.create_from_reader(info, &mut file, options)
    }

    fn read_all_bytes(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Vec<u8>>;

    fn reader(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<Box<dyn ReadChannel>>;

    fn writer(&self, info: ObjectInfo, options: &[WriteOption]) -> StoreResult<Box<dyn WriteChannel>>;

    /// Open a write channel against a pre-signed upload URL.
    fn writer_for_signed_url(&self, url: &str) -> StoreResult<Box<dyn WriteChannel>>;

    // ---- Object metadata ----

    /// Metadata-only lookup. Returns `Ok(None)` if the object does not exist.
    fn get_object(&self, id: &ObjectRef, options: &[GetOption]) -> StoreResult<Option<Object>>;

    fn list_objects(&self, bucket: &str, options: &[ListOption]) -> StoreResult<Page<Object>>;

    /// Patch the object's metadata and content type; see [`ObjectInfo`] for
    /// how unset fields and removals apply. The payload is untouched.
    fn update_object(&self, info: ObjectInfo, options: &[TargetOption]) -> StoreResult<Object>;

    /// Returns `true` if the object existed.
    fn delete_object(&self, id: &ObjectRef, options: &[SourceOption]) -> StoreResult<bool>;

    fn compose(&self, request: ComposeRequest) -> StoreResult<Object>;

    fn copy(&self, request: CopyRequest) -> StoreResult<Object>;

    fn sign_url(
        &self,
        info: &ObjectInfo,
        valid_for: Duration,
        options: &[SignUrlOption],
    ) -> StoreResult<String>;

    /// Look up several objects. Default implementation calls
    /// [`Self::get_object`] for each id.
    fn get_objects(&self, ids: &[ObjectRef]) -> StoreResult<Vec<Option<Object>>> {
        ids.iter().map(|id| self.get_object(id, &[])).collect()
    }

    /// Update several objects. Default implementation calls
    /// [`Self::update_object`] for each entry and keeps per-entry outcomes.
    fn update_objects(&self, infos: Vec<ObjectInfo>) -> Vec<StoreResult<Object>> {
        infos
            .into_iter()
            .map(|info| self.update_object(info, &[]))
            .collect()
    }

    /// Delete several objects. Default implementation calls
    /// [`Self::delete_object`] for each id.
    fn delete_objects(&self, ids: &[ObjectRef]) -> StoreResult<Vec<bool>> {
        ids.iter().map(|id| self.delete_object(id, &[])).collect()
    }

    // ---- Access control ----

    fn get_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<Option<Acl>>;

    /// Add an ACL entry. Fails if the entity already has one.
    fn create_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl>;

    /// Create or replace the entity's ACL entry.
    fn update_acl(&self, scope: &AclScope, acl: Acl) -> StoreResult<Acl>;

    fn delete_acl(&self, scope: &AclScope, entity: &AclEntity) -> StoreResult<bool>;

    fn list_acls(&self, scope: &AclScope) -> StoreResult<Vec<Acl>>;

    fn get_iam_policy(&self, bucket: &str, options: &[BucketOption]) -> StoreResult<IamPolicy>;

    fn set_iam_policy(
        &self,
        bucket: &str,
        policy: IamPolicy,
        options: &[BucketOption],
    ) -> StoreResult<IamPolicy>;

    fn test_iam_permissions(
        &self,
        bucket: &str,
        permissions: &[String],
        options: &[BucketOption],
    ) -> StoreResult<Vec<bool>>;

    fn service_account(&self, project_id: &str) -> StoreResult<ServiceAccount>;

    // ---- HMAC key administration ----

    fn create_hmac_key(&self, service_account: &str) -> StoreResult<HmacKey>;

    fn list_hmac_keys(&self, service_account: Option<&str>) -> StoreResult<Vec<HmacKeyMetadata>>;

    fn get_hmac_key(&self, access_id: &str) -> StoreResult<HmacKeyMetadata>;

    fn update_hmac_key_state(
        &self,
        access_id: &str,
        state: HmacKeyState,
    ) -> StoreResult<HmacKeyMetadata>;

    /// Delete an inactive HMAC key.
    fn delete_hmac_key(&self, access_id: &str) -> StoreResult<()>;
}
