//! Route precedence.
//!
//! Routes on a listener are tried in order, so they're sorted most specific
//! first. Exact path matches beat prefixes, which beat regexes. Within a
//! path match type longer paths win, then routes with more header matches,
//! then routes with more query parameter matches. Routes that tie keep the
//! order they were attached in.

use std::cmp::Reverse;

use crate::ir::{HttpRoute, MatchType, XdsIrMap};

pub(crate) fn sort_xds_routes(xds: &mut XdsIrMap) {
    for ir in xds.values_mut() {
        for listener in &mut ir.http {
            sort_routes(&mut listener.routes);
        }
    }
}

pub(crate) fn sort_routes(routes: &mut [HttpRoute]) {
    // sort_by_key is stable
    routes.sort_by_key(|r| Reverse(specificity(r)));
}

fn specificity(route: &HttpRoute) -> (u8, usize, usize, usize) {
    let (path_rank, path_len) = match &route.path_match {
        Some(m) => {
            let rank = match m.match_type {
                MatchType::Exact => 3,
                MatchType::Prefix => 2,
                MatchType::SafeRegex => 1,
                MatchType::Suffix => 0,
            };
            (rank, m.value.len())
        }
        None => (0, 0),
    };

    (
        path_rank,
        path_len,
        route.header_matches.len(),
        route.query_param_matches.len(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::StringMatch;

    fn route(name: &str, path_match: Option<StringMatch>, headers: usize) -> HttpRoute {
        HttpRoute {
            name: name.to_string(),
            path_match,
            header_matches: (0..headers)
                .map(|i| StringMatch::exact("v").named(format!("h{i}")))
                .collect(),
            ..Default::default()
        }
    }

    fn names(routes: &[HttpRoute]) -> Vec<&str> {
        routes.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_sort_routes() {
        let mut routes = vec![
            route("none", None, 0),
            route("regex", Some(StringMatch::regex("/.*")), 0),
            route("prefix-root", Some(StringMatch::prefix("/")), 0),
            route("prefix-long", Some(StringMatch::prefix("/foo/bar")), 0),
            route("prefix-headers", Some(StringMatch::prefix("/")), 2),
            route("exact", Some(StringMatch::exact("/exact")), 0),
        ];
        sort_routes(&mut routes);

        assert_eq!(
            names(&routes),
            vec![
                "exact",
                "prefix-long",
                "prefix-headers",
                "prefix-root",
                "regex",
                "none"
            ]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut routes = vec![
            route("a", Some(StringMatch::prefix("/")), 0),
            route("b", Some(StringMatch::prefix("/")), 0),
            route("c", Some(StringMatch::prefix("/")), 0),
        ];
        sort_routes(&mut routes);
        assert_eq!(names(&routes), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_shuffled() {
        use rand::seq::SliceRandom;

        let expected = vec![
            route("exact", Some(StringMatch::exact("/exact")), 0),
            route("prefix-long", Some(StringMatch::prefix("/foo/bar")), 0),
            route("prefix-headers", Some(StringMatch::prefix("/foo")), 1),
            route("prefix", Some(StringMatch::prefix("/foo")), 0),
            route("regex", Some(StringMatch::regex("/.*")), 0),
        ];

        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let mut routes = expected.clone();
            routes.shuffle(&mut rng);
            sort_routes(&mut routes);
            assert_eq!(names(&routes), names(&expected));
        }
    }

    #[test]
    fn test_sort_arbtest() {
        arbtest::arbtest(|u| {
            let len = u.int_in_range(0..=16)?;
            let mut routes = Vec::with_capacity(len);
            for i in 0..len {
                let path = match u.int_in_range(0..=3)? {
                    0 => None,
                    1 => Some(StringMatch::exact("/".repeat(u.int_in_range(1..=4)?))),
                    2 => Some(StringMatch::prefix("/".repeat(u.int_in_range(1..=4)?))),
                    _ => Some(StringMatch::regex("/.*")),
                };
                routes.push(route(&i.to_string(), path, u.int_in_range(0..=3)?));
            }

            let mut sorted = routes.clone();
            sort_routes(&mut sorted);

            // a permutation, in non-increasing order of specificity
            assert_eq!(sorted.len(), routes.len());
            for pair in sorted.windows(2) {
                assert!(specificity(&pair[0]) >= specificity(&pair[1]));
            }

            // sorting again doesn't move anything
            let mut resorted = sorted.clone();
            sort_routes(&mut resorted);
            assert_eq!(resorted, sorted);
            Ok(())
        });
    }
}
