use anyhow::Result;

use ladle_core::LadleService;

use super::helpers::print_json;

pub(crate) fn cmd_user_add(
    service: &LadleService,
    username: &str,
    email: &str,
    json: bool,
) -> Result<()> {
    let user = service.register_user(username, email)?;
    if json {
        print_json(&user)?;
    } else {
        println!("Registered {} <{}> (id: {})", user.username, user.email, user.id);
        println!("Act as this user with: ladle --user {} ...", user.id);
    }
    Ok(())
}

pub(crate) fn cmd_user_show(service: &LadleService, user_id: i64, json: bool) -> Result<()> {
    let user = service.get_user(user_id)?;
    if json {
        print_json(&user)?;
    } else {
        println!("{} <{}>", user.username, user.email);
        println!("ID: {}  Joined: {}", user.id, user.created_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_add_and_show() {
        let service = LadleService::new_in_memory().unwrap();
        cmd_user_add(&service, "cook", "cook@example.com", true).unwrap();
        cmd_user_show(&service, 1, false).unwrap();
        assert!(cmd_user_add(&service, "again", "COOK@example.com", false).is_err());
        assert!(cmd_user_show(&service, 404, true).is_err());
    }
}
