use crate::{
    model::{
        ModelManager,
        error::{DatabaseError, DatabaseResult},
    },
    web::{AuthenticatedUser, UserRole},
};

#[async_trait::async_trait]
pub trait HasOwner {
    type OwnerId: PartialEq + Send + Sync;
    async fn get_owner_id(
        &self,
        mm: &ModelManager,
        ctx: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId>;
}

/// Whether `ctx` may modify `resource`: admins always, everyone else only when
/// the resource's owner equals `expected`.
pub async fn can_manage<T: HasOwner<OwnerId = O> + Sync, O: PartialEq + Send + Sync>(
    mm: &ModelManager,
    ctx: &AuthenticatedUser,
    resource: &T,
    expected: O,
) -> DatabaseResult<bool> {
    // admin can get all resources
    if ctx.user_role() == UserRole::Admin {
        return Ok(true);
    }

    let actual_owner = resource.get_owner_id(mm, ctx).await?;
    Ok(actual_owner == expected)
}

pub async fn check_access<T: HasOwner<OwnerId = O> + Sync, O: PartialEq + Send + Sync>(
    mm: &ModelManager,
    ctx: &AuthenticatedUser,
    resource: &T,
    expected: O,
) -> DatabaseResult<()> {
    if can_manage(mm, ctx, resource, expected).await? {
        Ok(())
    } else {
        Err(DatabaseError::Forbidden)
    }
}
