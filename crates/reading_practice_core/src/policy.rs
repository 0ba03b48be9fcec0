//! crates/reading_practice_core/src/policy.rs
//!
//! Role and ownership rules, independent of how requests reach them.

use uuid::Uuid;

use crate::domain::{Role, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("role '{0}' is not allowed to perform this action")]
    RoleNotAllowed(Role),
    #[error("access to another user's data is not allowed")]
    NotOwner,
    #[error("the user belongs to another class")]
    OtherClass,
}

pub fn ensure_role(principal: &User, allowed: &[Role]) -> Result<(), AccessError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(AccessError::RoleNotAllowed(principal.role))
    }
}

/// Admins pass unconditionally; everyone else must own the resource.
pub fn ensure_owner_or_admin(principal: &User, owner_id: Uuid) -> Result<(), AccessError> {
    if principal.role == Role::Admin || principal.id == owner_id {
        Ok(())
    } else {
        Err(AccessError::NotOwner)
    }
}

/// Teachers may act on students of their own class; students only on themselves.
pub fn ensure_same_class_or_admin(principal: &User, target: &User) -> Result<(), AccessError> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Teacher => match (&principal.class_id, &target.class_id) {
            (Some(mine), Some(theirs)) if mine == theirs => Ok(()),
            _ => Err(AccessError::OtherClass),
        },
        Role::Student => ensure_owner_or_admin(principal, target.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Level;
    use chrono::Utc;

    fn user(role: Role, class_id: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: format!("{}@school.test", role),
            name: "Test".into(),
            role,
            level: Level::Beginner,
            class_id: class_id.map(str::to_string),
            avatar: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_guard() {
        let student = user(Role::Student, None);
        assert_eq!(
            ensure_role(&student, &[Role::Teacher, Role::Admin]),
            Err(AccessError::RoleNotAllowed(Role::Student))
        );
        assert!(ensure_role(&user(Role::Teacher, None), &[Role::Teacher, Role::Admin]).is_ok());
    }

    #[test]
    fn ownership_guard() {
        let student = user(Role::Student, None);
        let other = user(Role::Student, None);
        assert!(ensure_owner_or_admin(&student, student.id).is_ok());
        assert_eq!(ensure_owner_or_admin(&student, other.id), Err(AccessError::NotOwner));
        assert!(ensure_owner_or_admin(&user(Role::Admin, None), other.id).is_ok());
    }

    #[test]
    fn class_guard() {
        let teacher = user(Role::Teacher, Some("CM2-A"));
        let mine = user(Role::Student, Some("CM2-A"));
        let theirs = user(Role::Student, Some("CM2-B"));
        let unassigned = user(Role::Student, None);
        assert!(ensure_same_class_or_admin(&teacher, &mine).is_ok());
        assert_eq!(ensure_same_class_or_admin(&teacher, &theirs), Err(AccessError::OtherClass));
        assert_eq!(
            ensure_same_class_or_admin(&teacher, &unassigned),
            Err(AccessError::OtherClass)
        );
        assert!(ensure_same_class_or_admin(&user(Role::Admin, None), &theirs).is_ok());
    }
}
