use db::user::User;

use crate::error::AppError;

#[derive(Debug)]
/// An action restricted to some accounts.
pub enum Permission {
    CreateCampaign,
    /// Add options to an existing campaign.
    ManageOptions,
    /// See results, the demographic summary and the CSV export.
    ViewResults,
    /// Use the table browser, including deleting and uploading rows.
    BrowseTables,
}

impl Permission {
    fn denial(&self) -> &'static str {
        match self {
            Permission::CreateCampaign => "Only admins can create polls.",
            Permission::ManageOptions => "Only admins can manage poll options.",
            Permission::ViewResults => "Only admins can view poll results.",
            Permission::BrowseTables => "Only admins can browse tables.",
        }
    }
}

/// Returns whether a requester has the requisite permission.
#[tracing::instrument(skip(user), fields(user = user.map(|u| u.id)))]
pub fn has_permission(user: Option<&User>, permission: &Permission) -> bool {
    match permission {
        Permission::CreateCampaign
        | Permission::ManageOptions
        | Permission::ViewResults
        | Permission::BrowseTables => user.is_some_and(User::is_admin),
    }
}

/// Like [`has_permission`], but produces the message shown to the user when
/// the permission is missing.
pub fn require(
    user: Option<&User>,
    permission: Permission,
) -> Result<(), AppError> {
    if has_permission(user, &permission) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(permission.denial().to_string()))
    }
}
