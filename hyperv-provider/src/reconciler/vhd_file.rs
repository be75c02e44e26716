//! Virtual hard disk file reconciler.

use async_trait::async_trait;
use hyperv_mgmt::method::{
    CreateVirtualHardDisk, DeleteDataFile, GetVirtualHardDiskSettingData, RemoteMethod, ResizeVirtualHardDisk,
};
use hyperv_mgmt::{EmbeddedObject, Instance, Properties, Query, ServiceRole, classes};
use tracing::info;

use super::{Changes, Reconciler};
use crate::context::{ReconcileContext, RemoteScope};
use crate::error::{ReconcileError, Result};
use crate::resources::vhd_file::{DEFAULT_BLOCK_SIZE, DiskFormat, DiskType};
use crate::resources::{ResourceKind, VhdFileInputs, identity};

const SECTOR_SIZE: u32 = 512;

pub struct VhdFileReconciler;

fn file_query(path: &str) -> Query {
    Query::by_name(classes::DATA_FILE, "Name", path)
}

fn invalid(id: &str, reason: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidInput {
        kind: ResourceKind::VhdFile,
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Differencing disks need a parent, all others a size.
fn validate(id: &str, inputs: &VhdFileInputs) -> Result<()> {
    if inputs.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
        return Err(invalid(id, "path is required"));
    }
    match DiskType::resolve(inputs.disk_type.as_deref()) {
        DiskType::Differencing if inputs.parent_path.is_none() => {
            Err(invalid(id, "parentPath is required for differencing disks"))
        }
        DiskType::Fixed | DiskType::Dynamic if inputs.size_bytes.is_none_or(|s| s == 0) => {
            Err(invalid(id, "sizeBytes is required for fixed and dynamic disks"))
        }
        _ => Ok(()),
    }
}

fn disk_settings(path: &str, inputs: &VhdFileInputs) -> EmbeddedObject {
    let disk_type = DiskType::resolve(inputs.disk_type.as_deref());
    let size = match disk_type {
        DiskType::Differencing => None,
        DiskType::Fixed | DiskType::Dynamic => inputs.size_bytes,
    };
    EmbeddedObject::new(classes::HARD_DISK_SETTINGS)
        .with("Path", path)
        .with("Type", disk_type.code())
        .with("Format", DiskFormat::from_path(path).code())
        .with_opt("MaxInternalSize", size)
        .with("BlockSize", inputs.block_size.unwrap_or(DEFAULT_BLOCK_SIZE))
        .with("LogicalSectorSize", SECTOR_SIZE)
        .with("PhysicalSectorSize", SECTOR_SIZE)
        .with_opt("ParentPath", inputs.parent_path.clone())
}

/// Descriptor with defaults applied.
fn declared_view(id: &str, inputs: &VhdFileInputs) -> VhdFileInputs {
    let mut filled = inputs.clone();
    filled.path = Some(id.to_string());
    filled.disk_type = Some(DiskType::resolve(inputs.disk_type.as_deref()).as_str().to_string());
    filled.block_size = Some(inputs.block_size.unwrap_or(DEFAULT_BLOCK_SIZE));
    filled
}

fn diff(old: &VhdFileInputs, new: &VhdFileInputs) -> Changes {
    let mut changes = Changes::default();
    changes.mark("size", new.size_bytes.is_some() && new.size_bytes != old.size_bytes);
    changes
}

impl VhdFileReconciler {
    async fn observe(&self, scope: &RemoteScope<'_>, file: &Instance, declared: &VhdFileInputs) -> Result<VhdFileInputs> {
        let path = file.get_str("Name").unwrap_or(scope.id()).to_string();
        let ims = scope.service(ServiceRole::ImageManagement).await?;
        let outputs = scope.call(&ims, &GetVirtualHardDiskSettingData { path }).await?;
        let settings = outputs.get_object("SettingData").ok_or_else(|| {
            scope.unexpected(GetVirtualHardDiskSettingData::NAME, "no SettingData in result")
        })?;

        let mut observed = declared_view(scope.id(), declared);
        let disk_type = settings.get_u64("Type").and_then(DiskType::from_code);
        if let Some(disk_type) = disk_type {
            observed.disk_type = Some(disk_type.as_str().to_string());
        }
        if disk_type != Some(DiskType::Differencing) {
            observed.size_bytes = settings.get_u64("MaxInternalSize").or(observed.size_bytes);
        }
        if let Some(block_size) = settings.get_u64("BlockSize").and_then(|v| u32::try_from(v).ok()) {
            observed.block_size = Some(block_size);
        }
        if let Some(parent) = settings.get_str("ParentPath") {
            observed.parent_path = Some(parent.to_string());
        }
        Ok(observed)
    }

    async fn create_in(&self, scope: &RemoteScope<'_>, inputs: &VhdFileInputs) -> Result<VhdFileInputs> {
        let id = scope.id();
        if let Some(file) = scope.find(&file_query(id)).await? {
            scope.audit().resource_already_present(Self::KIND, id);
            return self.observe(scope, &file, inputs).await;
        }

        let ims = scope.service(ServiceRole::ImageManagement).await?;
        scope
            .call(
                &ims,
                &CreateVirtualHardDisk {
                    settings: disk_settings(id, inputs),
                },
            )
            .await?;
        scope.audit().resource_created(Self::KIND, id);
        Ok(declared_view(id, inputs))
    }

    async fn read_in(&self, scope: &RemoteScope<'_>, inputs: &VhdFileInputs) -> Result<VhdFileInputs> {
        match scope.find(&file_query(scope.id())).await? {
            Some(file) => self.observe(scope, &file, inputs).await,
            None => Ok(declared_view(scope.id(), inputs)),
        }
    }

    async fn update_in(&self, scope: &RemoteScope<'_>, news: &VhdFileInputs, changes: &Changes) -> Result<VhdFileInputs> {
        let id = scope.id();
        if !scope.exists(&file_query(id)).await? {
            return Err(scope.missing());
        }
        if let Some(size) = news.size_bytes.filter(|_| changes.has("size")) {
            let ims = scope.service(ServiceRole::ImageManagement).await?;
            scope
                .call(
                    &ims,
                    &ResizeVirtualHardDisk {
                        path: id.to_string(),
                        max_internal_size: size,
                    },
                )
                .await?;
        }
        scope.audit().resource_updated(Self::KIND, id, changes.groups());
        Ok(declared_view(id, news))
    }

    async fn delete_in(&self, scope: &RemoteScope<'_>) -> Result<()> {
        let id = scope.id();
        let Some(file) = scope.find(&file_query(id)).await? else {
            scope.audit().resource_already_absent(Self::KIND, id);
            return Ok(());
        };
        scope.call(file.handle(), &DeleteDataFile).await?;
        scope.audit().resource_deleted(Self::KIND, id);
        Ok(())
    }
}

#[async_trait]
impl Reconciler for VhdFileReconciler {
    const KIND: ResourceKind = ResourceKind::VhdFile;
    type Inputs = VhdFileInputs;
    type Outputs = VhdFileInputs;

    /// A disk file is identified by its path.
    fn identity(&self, inputs: &Self::Inputs, fallback: &str) -> String {
        identity(inputs.path.as_deref(), fallback)
    }

    async fn create(
        &self,
        ctx: &ReconcileContext,
        name: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)> {
        let id = self.identity(inputs, name);
        validate(&id, inputs)?;
        if dry_run {
            return Ok((id.clone(), declared_view(&id, inputs)));
        }
        info!("Reconciling vhd file {}", id);

        let session = ctx.open(Self::KIND, &id).await?;
        let result = self.create_in(&ctx.scope(&session, Self::KIND, &id), inputs).await;
        ctx.close(session).await;
        Ok((id, result?))
    }

    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)> {
        if dry_run {
            return Ok((id.to_string(), declared_view(id, inputs)));
        }

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.read_in(&ctx.scope(&session, Self::KIND, id), inputs).await;
        ctx.close(session).await;
        Ok((id.to_string(), result?))
    }

    async fn update(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        olds: &Self::Outputs,
        news: &Self::Inputs,
        dry_run: bool,
    ) -> Result<Self::Outputs> {
        let immutable = |field| ReconcileError::Immutable {
            kind: Self::KIND,
            id: id.to_string(),
            field,
        };
        if news.path.as_deref().is_some_and(|path| path != id) {
            return Err(immutable("path"));
        }
        if DiskType::resolve(olds.disk_type.as_deref()) != DiskType::resolve(news.disk_type.as_deref()) {
            return Err(immutable("diskType"));
        }
        if olds.parent_path != news.parent_path {
            return Err(immutable("parentPath"));
        }
        if olds.block_size.unwrap_or(DEFAULT_BLOCK_SIZE) != news.block_size.unwrap_or(DEFAULT_BLOCK_SIZE) {
            return Err(immutable("blockSize"));
        }

        let changes = diff(olds, news);
        if dry_run || changes.is_empty() {
            let mut preview = declared_view(id, news);
            preview.size_bytes = news.size_bytes.or(olds.size_bytes);
            return Ok(preview);
        }
        info!("Reconciling vhd file {} (resize)", id);

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.update_in(&ctx.scope(&session, Self::KIND, id), news, &changes).await;
        ctx.close(session).await;
        result
    }

    async fn delete(&self, ctx: &ReconcileContext, id: &str, _outputs: &Self::Outputs, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        info!("Finalizing (deleting) vhd file {}", id);

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.delete_in(&ctx.scope(&session, Self::KIND, id)).await;
        ctx.close(session).await;
        result
    }
}
