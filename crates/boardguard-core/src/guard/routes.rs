/// Login view path.
pub const LOGIN_PATH: &str = "/login";

/// Terminal view for boards that do not exist.
pub const NOT_FOUND_PATH: &str = "/not-found";

/// Terminal view for boards the caller may not see.
pub const ACCESS_DENIED_PATH: &str = "/access-denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteName {
    Login,
    BoardList,
    BoardAdd,
    BoardTasks,
    TaskDetail,
    BoardStatuses,
    Collaborators,
    NotFound,
    AccessDenied,
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub name: RouteName,
    pub pattern: &'static str,
    pub requires_auth: bool,
}

/// Route table, matched in order.
pub const ROUTES: &[Route] = &[
    Route { name: RouteName::Login, pattern: LOGIN_PATH, requires_auth: false },
    Route { name: RouteName::NotFound, pattern: NOT_FOUND_PATH, requires_auth: false },
    Route { name: RouteName::AccessDenied, pattern: ACCESS_DENIED_PATH, requires_auth: false },
    Route { name: RouteName::BoardList, pattern: "/board", requires_auth: true },
    Route { name: RouteName::BoardAdd, pattern: "/board/add", requires_auth: true },
    Route { name: RouteName::BoardTasks, pattern: "/board/:id/task", requires_auth: true },
    Route { name: RouteName::TaskDetail, pattern: "/board/:id/task/:taskId", requires_auth: true },
    Route { name: RouteName::BoardStatuses, pattern: "/board/:id/status", requires_auth: true },
    Route { name: RouteName::Collaborators, pattern: "/board/:id/collab", requires_auth: true },
];

/// A path matched against the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    /// The path as requested, query string included.
    pub path: String,
    pub route: RouteName,
    pub requires_auth: bool,
    pub board_id: Option<String>,
    pub task_id: Option<String>,
}

impl NavigationTarget {
    pub fn is_login(&self) -> bool {
        self.route == RouteName::Login
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Target(NavigationTarget),
    /// `/` and unknown paths fall through to the landing view.
    Fallback,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn match_route(path: &str) -> RouteMatch {
    let bare = path.split(['?', '#']).next().unwrap_or_default();
    let requested = segments(bare);

    for route in ROUTES {
        let pattern = segments(route.pattern);
        if pattern.len() != requested.len() {
            continue;
        }

        let mut board_id = None;
        let mut task_id = None;
        let matched = pattern.iter().zip(&requested).all(|(p, r)| match *p {
            ":id" => {
                board_id = Some((*r).to_string());
                true
            }
            ":taskId" => {
                task_id = Some((*r).to_string());
                true
            }
            literal => literal == *r,
        });

        if matched {
            return RouteMatch::Target(NavigationTarget {
                path: path.to_string(),
                route: route.name,
                requires_auth: route.requires_auth,
                board_id,
                task_id,
            });
        }
    }

    RouteMatch::Fallback
}
